//! Stampede: a staged virtual-user load-generation engine.
//!
//! A [`TestPlan`] owns a set of scenarios, each driving a named
//! [`Journey`] with a population of virtual users ramped up and down
//! across [`Stage`]s. Virtual users issue cookie-aware HTTP requests
//! through a shared connection pool, run named checks, and record into
//! lock-free metric series; thresholds judge the final aggregates.
//!
//! ```no_run
//! use stampede::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stampede::Error> {
//!     let plan = TestPlan::new("http://localhost:3000/");
//!     let journey = Journey::new("visit", |cx| {
//!         Box::pin(async move {
//!             cx.group("Home");
//!             let res = cx.get("/", "home_page").await?;
//!             cx.check("status is 200", &res, |r| r.status() == StatusCode::OK);
//!             cx.think(Duration::from_secs(1)..=Duration::from_secs(3)).await;
//!             Ok(())
//!         })
//!     });
//!
//!     let report = plan
//!         .journey(journey)
//!         .scenario(
//!             ScenarioSpec::new("smoke", "visit")
//!                 .stage(Duration::from_secs(30), 10)
//!                 .stage(Duration::from_secs(30), 0),
//!         )
//!         .threshold("http_req_duration", "p(95)<1500")
//!         .run()
//!         .await?;
//!
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod http;
pub mod journey;
pub mod metrics;

mod error;
mod runner;
mod scheduler;

pub use error::Error;
pub use http::PageResponse;
pub use journey::{BoxFuture, Journey, VuContext};
pub use runner::TestPlan;

pub use reqwest::StatusCode;
pub use stampede_core::{
    ConfigError, CounterSummary, MetricKind, MetricSummary, RateSummary, ScenarioSpec, Stage,
    TestReport, Threshold, ThresholdVerdict, TrendSummary,
};

pub mod prelude {
    pub use crate::journey::{Journey, VuContext};
    pub use crate::metrics::{Counter, Rate, Registry, Trend};
    pub use crate::runner::TestPlan;
    pub use crate::Error;
    pub use reqwest::StatusCode;
    pub use stampede_core::{ScenarioSpec, Stage, TestReport};
}
