//! Event sink system for observability.
//!
//! The orchestrator reports every lifecycle transition of an invocation to
//! an [`EventSink`]. Sinks are attached per pipeline definition.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
