//! Analysis stage.
//!
//! The executor runs plan steps against a dataset; the aggregator turns
//! stage outputs into the response envelope.

pub mod aggregator;
pub mod executor;
mod exports;

pub use executor::{ExecutorSettings, StepExecutor};
