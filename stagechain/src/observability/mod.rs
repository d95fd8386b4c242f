//! Logging initialization and timing helpers.
//!
//! The orchestrator logs through `tracing` unconditionally. Applications
//! decide where those records go by calling [`init_tracing`] once at startup.

mod tracing;

pub use tracing::{init_tracing, LogFormat, ObservabilityConfig, SpanTimer};
