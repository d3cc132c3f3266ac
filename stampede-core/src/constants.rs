use std::time::Duration;

/// How often a scheduler re-derives its virtual-user target from the
/// stage timeline.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default time a retiring virtual user gets to finish its current
/// iteration before it is forcibly cancelled.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Default number of virtual users the first stage interpolates from.
pub const DEFAULT_START_VUS: u32 = 1;
