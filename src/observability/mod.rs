//! Logging, request tracing and metrics.

pub mod logging;
pub mod metrics;
pub mod spans;
