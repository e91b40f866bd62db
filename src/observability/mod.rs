//! Observability for the authorizer
//!
//! Metrics go through the [`MetricsReporter`] seam; logs go through
//! `tracing` (see [`crate::logging`]).

pub mod metrics;
pub mod recorder;

pub use metrics::*;
pub use recorder::*;
