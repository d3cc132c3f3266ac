//! Immutable aggregate views of metric series, produced by snapshotting
//! the live registry at evaluation time.

/// The three series kinds the engine aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSummary {
    Counter(CounterSummary),
    Rate(RateSummary),
    Trend(TrendSummary),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Counter(_) => MetricKind::Counter,
            MetricSummary::Rate(_) => MetricKind::Rate,
            MetricSummary::Trend(_) => MetricKind::Trend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSummary {
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSummary {
    pub hits: u64,
    pub total: u64,
}

impl RateSummary {
    /// Fraction of `true` samples; 0.0 when no samples were recorded.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

/// Distribution summary over the full recorded value list (milliseconds
/// for timing series), giving exact percentiles at the sample volumes
/// a single run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    sorted: Vec<f64>,
}

impl TrendSummary {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        Self { sorted: values }
    }

    pub fn count(&self) -> usize {
        self.sorted.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.sorted.is_empty() {
            None
        } else {
            Some(self.sorted.iter().sum::<f64>() / self.sorted.len() as f64)
        }
    }

    /// Exact percentile (`q` in 0..=100) with linear interpolation
    /// between adjacent ranks.
    pub fn percentile(&self, q: f64) -> Option<f64> {
        if self.sorted.is_empty() || !(0.0..=100.0).contains(&q) {
            return None;
        }
        let rank = q / 100.0 * (self.sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            return Some(self.sorted[lo]);
        }
        let frac = rank - lo as f64;
        Some(self.sorted[lo] + (self.sorted[hi] - self.sorted[lo]) * frac)
    }
}
