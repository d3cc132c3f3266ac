//! Core types for the stampede load-generation engine.
//!
//! Everything in this crate is runtime-agnostic: scenario and stage
//! configuration, threshold expressions, and the aggregate summaries a
//! finished run is judged against. The async machinery lives in the
//! `stampede` crate.

mod config;
mod constants;
mod report;
mod summary;
mod threshold;

pub use config::*;
pub use constants::*;
pub use report::*;
pub use summary::*;
pub use threshold::*;
