use crate::config::ConfigError;
use crate::summary::{MetricKind, MetricSummary};
use std::fmt;

/// A pass/fail predicate over one metric series, evaluated at run end.
///
/// Parsed from the k6-style expression grammar: `p(95)<3000`,
/// `rate<0.05`, `count>100`, `avg<=500`, `min>1`, `max<2000`. Trend
/// values are in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expr: String,
    agg: Aggregate,
    op: Op,
    value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Aggregate {
    Percentile(f64),
    Rate,
    Count,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn holds(&self, measured: f64, value: f64) -> bool {
        match self {
            Op::Lt => measured < value,
            Op::Le => measured <= value,
            Op::Gt => measured > value,
            Op::Ge => measured >= value,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

impl Threshold {
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ConfigError> {
        let fail = |reason: &str| ConfigError::Threshold {
            metric: metric.to_string(),
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let op_at = compact
            .find(['<', '>'])
            .ok_or_else(|| fail("missing comparator"))?;
        let (lhs, mut rhs) = compact.split_at(op_at);

        let op = if rhs.starts_with("<=") {
            rhs = &rhs[2..];
            Op::Le
        } else if rhs.starts_with(">=") {
            rhs = &rhs[2..];
            Op::Ge
        } else if rhs.starts_with('<') {
            rhs = &rhs[1..];
            Op::Lt
        } else {
            rhs = &rhs[1..];
            Op::Gt
        };

        let agg = match lhs {
            "rate" => Aggregate::Rate,
            "count" => Aggregate::Count,
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            _ => {
                let inner = lhs
                    .strip_prefix("p(")
                    .and_then(|s| s.strip_suffix(')'))
                    .ok_or_else(|| fail("unknown aggregate"))?;
                let q: f64 = inner.parse().map_err(|_| fail("bad percentile"))?;
                if !(0.0..=100.0).contains(&q) {
                    return Err(fail("percentile out of range"));
                }
                Aggregate::Percentile(q)
            }
        };

        let value: f64 = rhs.parse().map_err(|_| fail("bad comparison value"))?;

        Ok(Self {
            metric: metric.to_string(),
            expr: expr.to_string(),
            agg,
            op,
            value,
        })
    }

    /// Startup validation: the aggregate must match the kind of series
    /// the metric name resolves to.
    pub fn check_kind(&self, kind: MetricKind) -> Result<(), ConfigError> {
        let ok = match self.agg {
            Aggregate::Rate => kind == MetricKind::Rate,
            Aggregate::Count => kind == MetricKind::Counter,
            Aggregate::Percentile(_) | Aggregate::Avg | Aggregate::Min | Aggregate::Max => {
                kind == MetricKind::Trend
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::ThresholdKind {
                metric: self.metric.clone(),
                expr: self.expr.clone(),
                kind: kind.as_str(),
            })
        }
    }

    /// Evaluate against the final snapshot. A missing series, or one
    /// with no recorded data, fails the threshold.
    pub fn evaluate(&self, summary: Option<&MetricSummary>) -> ThresholdVerdict {
        let measured = summary.and_then(|s| self.measure(s));
        let passed = measured.is_some_and(|m| self.op.holds(m, self.value));
        ThresholdVerdict {
            metric: self.metric.clone(),
            expr: self.expr.clone(),
            measured,
            passed,
        }
    }

    fn measure(&self, summary: &MetricSummary) -> Option<f64> {
        match (self.agg, summary) {
            (Aggregate::Count, MetricSummary::Counter(c)) => Some(c.total as f64),
            (Aggregate::Rate, MetricSummary::Rate(r)) => {
                (r.total > 0).then(|| r.rate())
            }
            (Aggregate::Percentile(q), MetricSummary::Trend(t)) => t.percentile(q),
            (Aggregate::Avg, MetricSummary::Trend(t)) => t.mean(),
            (Aggregate::Min, MetricSummary::Trend(t)) => t.min(),
            (Aggregate::Max, MetricSummary::Trend(t)) => t.max(),
            _ => None,
        }
    }
}

/// Outcome of one threshold, independent of every other threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expr: String,
    pub measured: Option<f64>,
    pub passed: bool,
}

impl fmt::Display for ThresholdVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        match self.measured {
            Some(m) => write!(
                f,
                "{status} {}: {} (measured {m:.2})",
                self.metric, self.expr
            ),
            None => write!(f, "{status} {}: {} (no data)", self.metric, self.expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{CounterSummary, RateSummary, TrendSummary};

    #[test]
    fn parses_percentile_expression() {
        let t = Threshold::parse("page_load_time", "p(95) < 3000").unwrap();
        assert_eq!(t.agg, Aggregate::Percentile(95.0));
        assert_eq!(t.op, Op::Lt);
        assert_eq!(t.value, 3000.0);
    }

    #[test]
    fn parses_rate_and_count_expressions() {
        let r = Threshold::parse("error_rate", "rate<0.05").unwrap();
        assert_eq!(r.agg, Aggregate::Rate);
        let c = Threshold::parse("successful_logins", "count>=10").unwrap();
        assert_eq!(c.agg, Aggregate::Count);
        assert_eq!(c.op, Op::Ge);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(Threshold::parse("m", "p95<3000").is_err());
        assert!(Threshold::parse("m", "p(95)=3000").is_err());
        assert!(Threshold::parse("m", "p(195)<3000").is_err());
        assert!(Threshold::parse("m", "rate<abc").is_err());
    }

    #[test]
    fn kind_mismatch_is_a_config_error() {
        let t = Threshold::parse("http_reqs", "rate<0.5").unwrap();
        assert!(t.check_kind(MetricKind::Counter).is_err());
        assert!(t.check_kind(MetricKind::Rate).is_ok());
    }

    #[test]
    fn p95_fails_above_and_passes_below() {
        let t = Threshold::parse("d", "p(95)<3000").unwrap();

        let slow = MetricSummary::Trend(TrendSummary::from_values(vec![3500.0; 100]));
        assert!(!t.evaluate(Some(&slow)).passed);

        let fast = MetricSummary::Trend(TrendSummary::from_values(vec![2999.0; 100]));
        assert!(t.evaluate(Some(&fast)).passed);
    }

    #[test]
    fn rate_threshold_over_two_thirds() {
        let t = Threshold::parse("error_rate", "rate<0.5").unwrap();
        let s = MetricSummary::Rate(RateSummary { hits: 2, total: 3 });
        let verdict = t.evaluate(Some(&s));
        assert!(!verdict.passed);
        assert_eq!(verdict.measured, Some(2.0 / 3.0));
    }

    #[test]
    fn missing_or_empty_series_fails() {
        let t = Threshold::parse("ghost", "p(95)<3000").unwrap();
        assert!(!t.evaluate(None).passed);

        let empty = MetricSummary::Trend(TrendSummary::from_values(vec![]));
        let verdict = t.evaluate(Some(&empty));
        assert!(!verdict.passed);
        assert_eq!(verdict.measured, None);
    }

    #[test]
    fn count_threshold_reads_counter_total() {
        let t = Threshold::parse("successful_logins", "count>0").unwrap();
        let s = MetricSummary::Counter(CounterSummary { total: 42 });
        assert!(t.evaluate(Some(&s)).passed);
    }
}
