use crate::constants::{DEFAULT_GRACEFUL_STOP, DEFAULT_START_VUS};
use std::time::Duration;
use thiserror::Error;

/// One ramp segment of a scenario timeline.
///
/// While a stage is active the virtual-user target is interpolated
/// linearly from the previous stage's target (or `start_vus` for the
/// first stage) towards this stage's `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Configuration for a single scenario: a named load pattern run
/// independently within a test. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    /// Name of the registered journey function this scenario drives.
    pub exec: String,
    pub start_vus: u32,
    pub stages: Vec<Stage>,
    /// Offset from test start before this scenario begins.
    pub start_time: Duration,
    pub graceful_stop: Duration,
}

impl ScenarioSpec {
    pub fn new(name: &str, exec: &str) -> Self {
        Self {
            name: name.to_string(),
            exec: exec.to_string(),
            start_vus: DEFAULT_START_VUS,
            stages: vec![],
            start_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    pub fn start_vus(mut self, start_vus: u32) -> Self {
        self.start_vus = start_vus;
        self
    }

    pub fn stage(mut self, duration: Duration, target: u32) -> Self {
        self.stages.push(Stage::new(duration, target));
        self
    }

    pub fn start_time(mut self, offset: Duration) -> Self {
        self.start_time = offset;
        self
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::EmptyStages(self.name.clone()));
        }
        if self.total_duration().is_zero() {
            return Err(ConfigError::ZeroTimeline(self.name.clone()));
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// The virtual-user target at `elapsed` time into the scenario,
    /// derived by piecewise-linear interpolation across the stages.
    ///
    /// At the exact end of a stage the target equals that stage's
    /// declared target. Past the end of the timeline the final stage's
    /// target holds.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut base = self.start_vus as f64;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            let end = offset + stage.duration;
            if elapsed < end {
                let frac = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                let target = stage.target as f64;
                return (base + (target - base) * frac).round() as u32;
            }
            base = stage.target as f64;
            offset = end;
        }
        self.stages.last().map(|s| s.target).unwrap_or(self.start_vus)
    }
}

/// Errors that are fatal at startup; the run does not begin.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scenario `{0}` has no stages")]
    EmptyStages(String),
    #[error("scenario `{0}` has a zero-length stage timeline")]
    ZeroTimeline(String),
    #[error("scenario `{0}` references unknown executor `{1}`")]
    UnknownExecutor(String, String),
    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),
    #[error("metric `{0}` is already registered as a different kind")]
    MetricKind(String),
    #[error("invalid threshold `{expr}` on `{metric}`: {reason}")]
    Threshold {
        metric: String,
        expr: String,
        reason: String,
    },
    #[error("threshold `{expr}` does not apply to {kind} metric `{metric}`")]
    ThresholdKind {
        metric: String,
        expr: String,
        kind: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp_spec() -> ScenarioSpec {
        ScenarioSpec::new("ramp", "noop")
            .start_vus(0)
            .stage(secs(120), 100)
            .stage(secs(60), 100)
            .stage(secs(60), 0)
    }

    #[test]
    fn target_interpolates_within_a_stage() {
        let spec = ramp_spec();
        assert_eq!(spec.target_at(secs(60)), 50);
        assert_eq!(spec.target_at(secs(30)), 25);
    }

    #[test]
    fn target_is_exact_at_stage_boundaries() {
        let spec = ramp_spec();
        assert_eq!(spec.target_at(Duration::ZERO), 0);
        assert_eq!(spec.target_at(secs(120)), 100);
        assert_eq!(spec.target_at(secs(180)), 100);
        assert_eq!(spec.target_at(secs(240)), 0);
    }

    #[test]
    fn target_holds_past_the_timeline() {
        let spec = ramp_spec();
        assert_eq!(spec.target_at(secs(500)), 0);
    }

    #[test]
    fn first_stage_interpolates_from_start_vus() {
        let spec = ScenarioSpec::new("warm", "noop")
            .start_vus(10)
            .stage(secs(100), 110);
        assert_eq!(spec.target_at(Duration::ZERO), 10);
        assert_eq!(spec.target_at(secs(50)), 60);
    }

    #[test]
    fn zero_duration_stage_jumps_instantly() {
        let spec = ScenarioSpec::new("spike", "noop")
            .start_vus(0)
            .stage(Duration::ZERO, 50)
            .stage(secs(10), 50);
        assert_eq!(spec.target_at(Duration::ZERO), 50);
    }

    #[test]
    fn validate_rejects_empty_stages() {
        let spec = ScenarioSpec::new("empty", "noop");
        assert!(matches!(spec.validate(), Err(ConfigError::EmptyStages(_))));
    }

    #[test]
    fn validate_rejects_zero_timeline() {
        let spec = ScenarioSpec::new("zero", "noop").stage(Duration::ZERO, 10);
        assert!(matches!(spec.validate(), Err(ConfigError::ZeroTimeline(_))));
    }
}
