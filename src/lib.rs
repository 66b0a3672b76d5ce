//! Scalar metrics from training event logs: extraction into tidy tables,
//! best-value summaries and multi-run comparison plots.

pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod report;

pub use error::{Error, Result};
