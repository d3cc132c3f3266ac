use crate::summary::MetricSummary;
use crate::threshold::ThresholdVerdict;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Final, immutable result of a test run: every series' aggregates plus
/// the per-threshold verdicts.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub duration: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub thresholds: Vec<ThresholdVerdict>,
}

impl TestReport {
    /// A single unmet threshold fails the whole run.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdVerdict> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "test run finished in {}",
            humantime::format_duration(Duration::from_secs(self.duration.as_secs()))
        )?;
        for (name, summary) in &self.metrics {
            match summary {
                MetricSummary::Counter(c) => {
                    writeln!(f, "  {name}: count={}", c.total)?;
                }
                MetricSummary::Rate(r) => {
                    writeln!(
                        f,
                        "  {name}: rate={:.2}% ({}/{})",
                        r.rate() * 100.0,
                        r.hits,
                        r.total
                    )?;
                }
                MetricSummary::Trend(t) => {
                    if t.count() == 0 {
                        writeln!(f, "  {name}: no samples")?;
                        continue;
                    }
                    writeln!(
                        f,
                        "  {name}: avg={:.2}ms min={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms p(99)={:.2}ms",
                        t.mean().unwrap_or(0.0),
                        t.min().unwrap_or(0.0),
                        t.max().unwrap_or(0.0),
                        t.percentile(90.0).unwrap_or(0.0),
                        t.percentile(95.0).unwrap_or(0.0),
                        t.percentile(99.0).unwrap_or(0.0),
                    )?;
                }
            }
        }
        for verdict in &self.thresholds {
            writeln!(f, "  {verdict}")?;
        }
        Ok(())
    }
}
