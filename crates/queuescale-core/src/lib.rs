//! queuescale-core — shared types for the queue-depth autoscaler.
//!
//! Holds the data model the decision engine works on (policy, queue
//! metrics, replica state, scaling actions), the `queuescale.toml`
//! configuration model, and the error taxonomy used by every adapter.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ScalerConfig, ValidatedConfig, parse_duration};
pub use error::*;
pub use types::*;
