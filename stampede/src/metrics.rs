//! Concurrency-safe metric accumulation.
//!
//! Counters and rates are plain relaxed atomics; trends accumulate into
//! an [`AtomicBucket`] that virtual users push to without locking and
//! that is merged into a sorted value list when a snapshot is taken.
//! With the `metrics` feature enabled every write is mirrored to the
//! `metrics` facade so external exporters can observe a run.

use metrics_util::AtomicBucket;
use stampede_core::{
    ConfigError, CounterSummary, MetricKind, MetricSummary, RateSummary, TrendSummary,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Names of the series the engine maintains on its own.
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const CHECKS: &str = "checks";
    pub const GROUP_ERRORS: &str = "group_errors";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_ERRORS: &str = "iteration_errors";
}

/// Shared name-to-series registry. Cloning is cheap and all clones
/// observe the same series. Lookup takes a lock; the handles it returns
/// write lock-free.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, Metric>>>,
}

#[derive(Clone)]
enum Metric {
    Counter(Counter),
    Rate(Rate),
    Trend(Trend),
}

impl Metric {
    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter. Fails if `name` is already registered
    /// as a different kind.
    pub fn counter(&self, name: &str) -> Result<Counter, ConfigError> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match map
            .entry(name.to_string())
            .or_insert_with(|| Metric::Counter(Counter::new(name)))
        {
            Metric::Counter(c) => Ok(c.clone()),
            _ => Err(ConfigError::MetricKind(name.to_string())),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Rate, ConfigError> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match map
            .entry(name.to_string())
            .or_insert_with(|| Metric::Rate(Rate::new(name)))
        {
            Metric::Rate(r) => Ok(r.clone()),
            _ => Err(ConfigError::MetricKind(name.to_string())),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Trend, ConfigError> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match map
            .entry(name.to_string())
            .or_insert_with(|| Metric::Trend(Trend::new(name)))
        {
            Metric::Trend(t) => Ok(t.clone()),
            _ => Err(ConfigError::MetricKind(name.to_string())),
        }
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(name).map(Metric::kind)
    }

    /// Immutable aggregate view of every series, for threshold
    /// evaluation and the final report.
    pub fn snapshot(&self) -> BTreeMap<String, MetricSummary> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(name, metric)| {
                let summary = match metric {
                    Metric::Counter(c) => MetricSummary::Counter(CounterSummary { total: c.total() }),
                    Metric::Rate(r) => MetricSummary::Rate(r.summary()),
                    Metric::Trend(t) => MetricSummary::Trend(t.summary()),
                };
                (name.clone(), summary)
            })
            .collect()
    }
}

/// Monotonically increasing sum.
#[derive(Clone)]
pub struct Counter {
    name: Arc<str>,
    total: Arc<AtomicU64>,
}

impl Counter {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!(self.name.to_string()).increment(n);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Tracks (hits, total); `add(true)` increments both.
#[derive(Clone)]
pub struct Rate {
    name: Arc<str>,
    hits: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl Rate {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            hits: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, hit: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        #[cfg(feature = "metrics")]
        metrics::counter!(self.name.to_string(), "hit" => if hit { "true" } else { "false" })
            .increment(1);
    }

    pub fn summary(&self) -> RateSummary {
        RateSummary {
            hits: self.hits.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Distribution of millisecond values supporting percentile queries.
#[derive(Clone)]
pub struct Trend {
    name: Arc<str>,
    values: Arc<AtomicBucket<f64>>,
}

impl Trend {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(AtomicBucket::new()),
        }
    }

    /// Record a value in milliseconds.
    pub fn record(&self, ms: f64) {
        self.values.push(ms);
        #[cfg(feature = "metrics")]
        metrics::histogram!(self.name.to_string()).record(ms);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_secs_f64() * 1e3);
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary::from_values(self.values.data())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handles for the engine-maintained series, registered once at startup
/// so the hot paths never touch the registry lock.
#[derive(Clone)]
pub(crate) struct BuiltinMetrics {
    pub http_reqs: Counter,
    pub http_req_duration: Trend,
    pub checks: Rate,
    pub group_errors: Rate,
    pub iterations: Counter,
    pub iteration_errors: Counter,
}

impl BuiltinMetrics {
    pub fn register(registry: &Registry) -> Result<Self, ConfigError> {
        Ok(Self {
            http_reqs: registry.counter(names::HTTP_REQS)?,
            http_req_duration: registry.trend(names::HTTP_REQ_DURATION)?,
            checks: registry.rate(names::CHECKS)?,
            group_errors: registry.rate(names::GROUP_ERRORS)?,
            iterations: registry.counter(names::ITERATIONS)?,
            iteration_errors: registry.counter(names::ITERATION_ERRORS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_sums_exactly() {
        let registry = Registry::new();
        let counter = registry.counter("c").unwrap();
        counter.add(3);
        counter.add(4);
        assert_eq!(counter.total(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_counter_adds_are_never_lost() {
        let registry = Registry::new();
        let counter = registry.counter("concurrent").unwrap();

        let mut tasks = vec![];
        for _ in 0..100 {
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counter.add(1);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counter.total(), 10_000);
    }

    #[test]
    fn rate_true_false_true_is_two_thirds() {
        let registry = Registry::new();
        let rate = registry.rate("r").unwrap();
        rate.add(true);
        rate.add(false);
        rate.add(true);
        let summary = rate.summary();
        assert_eq!(summary.hits, 2);
        assert_eq!(summary.total, 3);
        assert!((summary.rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_trend_records_are_never_lost() {
        let registry = Registry::new();
        let trend = registry.trend("t").unwrap();

        let mut tasks = vec![];
        for i in 0..50 {
            let trend = trend.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..100 {
                    trend.record((i * 100 + j) as f64);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(trend.summary().count(), 5_000);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let registry = Registry::new();
        registry.counter("m").unwrap();
        assert!(matches!(
            registry.trend("m"),
            Err(ConfigError::MetricKind(_))
        ));
        // original handle still works
        assert!(registry.counter("m").is_ok());
    }

    #[test]
    fn snapshot_reflects_all_series() {
        let registry = Registry::new();
        registry.counter("a").unwrap().add(2);
        registry.rate("b").unwrap().add(true);
        registry.trend("c").unwrap().record(1.5);

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(
            snap.get("a"),
            Some(&MetricSummary::Counter(CounterSummary { total: 2 }))
        );
        assert_eq!(snap.get("c").map(|m| m.kind()), Some(MetricKind::Trend));
    }
}
