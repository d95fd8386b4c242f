//! Event sink trait and implementations.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// One lifecycle event emitted by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    /// Dotted event type (e.g., "stage.started").
    pub event_type: &'static str,
    /// Name of the pipeline definition.
    pub pipeline: String,
    /// Invocation that produced the event.
    pub invocation_id: Uuid,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event-specific payload.
    pub data: serde_json::Value,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: &'static str,
        pipeline: impl Into<String>,
        invocation_id: Uuid,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            pipeline: pipeline.into(),
            invocation_id,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Returns the `stage` field of the payload, if present.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.data.get("stage").and_then(serde_json::Value::as_str)
    }
}

/// Receives pipeline lifecycle events.
///
/// Sinks must never fail the pipeline: implementations swallow and log their
/// own errors.
pub trait EventSink: Send + Sync {
    /// Emits an event without blocking.
    fn try_emit(&self, event: PipelineEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _event: PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event: PipelineEvent) {
        if self.level == Level::DEBUG {
            debug!(
                event_type = event.event_type,
                pipeline = %event.pipeline,
                invocation_id = %event.invocation_id,
                event_data = %event.data,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                event_type = event.event_type,
                pipeline = %event.pipeline,
                invocation_id = %event.invocation_id,
                event_data = %event.data,
                "Event: {}", event.event_type
            );
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(|e| e.event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &'static str, stage: &str) -> PipelineEvent {
        PipelineEvent::new(
            event_type,
            "test",
            Uuid::new_v4(),
            serde_json::json!({ "stage": stage }),
        )
    }

    #[test]
    fn test_noop_sink() {
        NoOpEventSink.try_emit(event("stage.started", "a"));
    }

    #[test]
    fn test_logging_sink() {
        LoggingEventSink::default().try_emit(event("stage.started", "a"));
        LoggingEventSink::debug().try_emit(event("stage.completed", "a"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.try_emit(event("stage.started", "lookup"));
        sink.try_emit(event("stage.completed", "lookup"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["stage.started", "stage.completed"]);
        assert_eq!(sink.events()[0].stage(), Some("lookup"));
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        sink.try_emit(event("pipeline.started", "-"));
        sink.try_emit(event("stage.started", "a"));
        sink.try_emit(event("stage.completed", "a"));

        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.events_of_type("pipeline.").len(), 1);
    }

    #[test]
    fn test_event_serializes() {
        let json = serde_json::to_value(event("stage.failed", "enrich")).unwrap();
        assert_eq!(json["event_type"], "stage.failed");
        assert_eq!(json["data"]["stage"], "enrich");
    }
}
