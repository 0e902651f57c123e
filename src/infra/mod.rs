//! Runtime bootstrap: tracing and metric descriptions.

pub mod error;
pub mod telemetry;
