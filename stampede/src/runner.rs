//! Test orchestration: owns the scenarios, starts each at its
//! configured offset, and judges the run against its thresholds once
//! every scheduler has drained.

use crate::error::Error;
use crate::http::HttpClient;
use crate::journey::Journey;
use crate::metrics::{BuiltinMetrics, Registry};
use crate::scheduler::Scheduler;
use reqwest::Url;
use stampede_core::{ConfigError, ScenarioSpec, TestReport, Threshold};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A full test: journeys, scenarios, thresholds, and the shared metric
/// registry. Configuration problems are fatal in [`TestPlan::run`]
/// before any virtual user spawns.
pub struct TestPlan {
    base_url: String,
    registry: Registry,
    journeys: HashMap<String, Journey>,
    scenarios: Vec<ScenarioSpec>,
    thresholds: Vec<(String, String)>,
    request_timeout: Duration,
    seed: Option<u64>,
}

impl TestPlan {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            registry: Registry::new(),
            journeys: HashMap::new(),
            scenarios: vec![],
            thresholds: vec![],
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            seed: None,
        }
    }

    /// The registry scenarios record into; create custom metric handles
    /// from it before building journeys.
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Register a journey function; scenarios reference it by name.
    pub fn journey(mut self, journey: Journey) -> Self {
        self.journeys.insert(journey.name().to_string(), journey);
        self
    }

    pub fn scenario(mut self, spec: ScenarioSpec) -> Self {
        self.scenarios.push(spec);
        self
    }

    /// Add a threshold expression (e.g. `p(95)<3000`) over a metric.
    pub fn threshold(mut self, metric: &str, expr: &str) -> Self {
        self.thresholds
            .push((metric.to_string(), expr.to_string()));
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fix the RNG seed for deterministic think-time and branching.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run every scenario to completion and evaluate all thresholds.
    ///
    /// The returned report is final and immutable; a nonzero
    /// [`TestReport::exit_code`] means at least one threshold failed.
    pub async fn run(self) -> Result<TestReport, Error> {
        let thresholds = self.validate()?;
        let builtins = BuiltinMetrics::register(&self.registry)?;
        // Kind-check thresholds against every series known up front
        // (built-ins plus custom handles created before the run).
        for threshold in &thresholds {
            if let Some(kind) = self.registry.kind(&threshold.metric) {
                threshold.check_kind(kind)?;
            }
        }

        let base_url = Url::parse(&self.base_url)?;
        let http = HttpClient::new(
            base_url,
            self.request_timeout,
            builtins.http_reqs.clone(),
            builtins.http_req_duration.clone(),
        )?;
        let seed = self.seed.unwrap_or_else(rand::random);

        info!(
            scenarios = self.scenarios.len(),
            thresholds = thresholds.len(),
            "test run starting"
        );
        let start = Instant::now();

        let mut handles = vec![];
        for spec in self.scenarios {
            let offset = spec.start_time;
            let journey = self.journeys[&spec.exec].clone();
            let scheduler = Scheduler::new(
                spec,
                journey,
                http.clone(),
                builtins.clone(),
                seed,
            );
            handles.push(tokio::spawn(async move {
                if !offset.is_zero() {
                    tokio::time::sleep(offset).await;
                }
                scheduler.run().await;
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                // Scheduler tasks recover journey failures internally,
                // so this only fires on an engine bug.
                error!(%err, "scenario task aborted");
            }
        }

        let duration = start.elapsed();
        let metrics = self.registry.snapshot();
        let verdicts: Vec<_> = thresholds
            .iter()
            .map(|t| t.evaluate(metrics.get(&t.metric)))
            .collect();
        for verdict in &verdicts {
            if verdict.passed {
                debug!(%verdict, "threshold passed");
            } else {
                warn!(%verdict, "threshold failed");
            }
        }

        info!(passed = verdicts.iter().all(|v| v.passed), "test run finished");
        Ok(TestReport {
            duration,
            metrics,
            thresholds: verdicts,
        })
    }

    fn validate(&self) -> Result<Vec<Threshold>, ConfigError> {
        let mut names = HashSet::new();
        for spec in &self.scenarios {
            spec.validate()?;
            if !names.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicateScenario(spec.name.clone()));
            }
            if !self.journeys.contains_key(&spec.exec) {
                return Err(ConfigError::UnknownExecutor(
                    spec.name.clone(),
                    spec.exec.clone(),
                ));
            }
        }
        self.thresholds
            .iter()
            .map(|(metric, expr)| Threshold::parse(metric, expr))
            .collect()
    }
}
