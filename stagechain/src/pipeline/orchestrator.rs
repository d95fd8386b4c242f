//! The sequential orchestrator loop.
//!
//! Stages run strictly one after another. The cancellation token is checked
//! before each stage starts and again after it settles; an in-flight stage
//! is never interrupted, but its result is discarded once the token trips.

use super::definition::{Payload, PipelineInner};
use crate::cancellation::{CancelReason, CancellationToken};
use crate::core::InvocationStatus;
use crate::errors::{Cause, FailureKind};
use crate::events::PipelineEvent;
use crate::observability::SpanTimer;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Per-invocation execution state. Never shared between invocations.
#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) pipeline: Arc<PipelineInner>,
    pub(crate) invocation_id: Uuid,
    pub(crate) token: Arc<CancellationToken>,
    current_stage: RwLock<Option<String>>,
    completed: AtomicUsize,
    status: RwLock<InvocationStatus>,
}

impl RunState {
    pub(crate) fn new(pipeline: Arc<PipelineInner>, token: Arc<CancellationToken>) -> Self {
        Self {
            pipeline,
            invocation_id: Uuid::new_v4(),
            token,
            current_stage: RwLock::new(None),
            completed: AtomicUsize::new(0),
            status: RwLock::new(InvocationStatus::Pending),
        }
    }

    pub(crate) fn span(&self) -> Span {
        info_span!(
            "pipeline",
            pipeline = %self.pipeline.name,
            invocation_id = %self.invocation_id,
        )
    }

    pub(crate) fn emit(&self, event_type: &'static str, data: serde_json::Value) {
        self.pipeline.emit(PipelineEvent::new(
            event_type,
            self.pipeline.name.clone(),
            self.invocation_id,
            data,
        ));
    }

    pub(crate) fn status(&self) -> InvocationStatus {
        *self.status.read()
    }

    /// Records the terminal status. Only the first call has any effect.
    pub(crate) fn finish(&self, status: InvocationStatus) -> bool {
        let mut current = self.status.write();
        if current.is_terminal() {
            return false;
        }
        *current = status;
        true
    }

    pub(crate) fn current_stage(&self) -> Option<String> {
        self.current_stage.read().clone()
    }

    pub(crate) fn stages_completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// The stage a deadline or cancellation should be attributed to: the one
    /// in flight, otherwise the next one due, otherwise the last one.
    pub(crate) fn interrupted_stage(&self) -> String {
        if let Some(stage) = self.current_stage() {
            return stage;
        }
        let stages = &self.pipeline.stages;
        stages
            .get(self.stages_completed())
            .or_else(|| stages.last())
            .map_or_else(|| self.pipeline.name.clone(), |s| s.name().to_string())
    }

    fn enter(&self, stage: &str) {
        *self.current_stage.write() = Some(stage.to_string());
        let mut status = self.status.write();
        if *status == InvocationStatus::Pending {
            *status = InvocationStatus::Running;
        }
    }

    fn leave(&self) {
        *self.current_stage.write() = None;
    }
}

/// Builds the terminal cause for a tripped token.
pub(crate) fn interruption_cause(reason: &CancelReason, origin_stage: impl Into<String>) -> Cause {
    let kind = if reason.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Cancelled
    };
    Cause::new(kind, reason.message.clone(), origin_stage)
}

/// Runs every stage of the pipeline in order against `input`.
///
/// Returns the last stage's payload, or the first failure tagged with the
/// stage it came from.
pub(crate) async fn drive(run: &RunState, input: Payload) -> Result<Payload, Cause> {
    let pipeline = &run.pipeline;
    let timer = SpanTimer::start(pipeline.name.as_str());

    run.emit(
        "pipeline.started",
        json!({ "stages": pipeline.stage_names() }),
    );

    let mut value = input;
    for (index, stage) in pipeline.stages.iter().enumerate() {
        let name = stage.name();

        if let Some(reason) = run.token.reason() {
            let cause = interruption_cause(&reason, name);
            info!(stage = name, reason = %reason.message, "Pipeline cancelled before stage started");
            run.emit(
                "pipeline.cancelled",
                json!({ "stage": name, "kind": cause.kind, "reason": reason.message }),
            );
            return Err(cause);
        }

        run.enter(name);
        run.emit(
            "stage.started",
            json!({ "stage": name, "kind": stage.kind(), "index": index }),
        );
        debug!(stage = name, index, "Stage started");

        let stage_timer = SpanTimer::start(name);
        let result = stage
            .invoke_erased(value)
            .instrument(info_span!("stage", stage = name, kind = %stage.kind()))
            .await;
        let duration_ms = stage_timer.finish();
        run.leave();

        if let Some(reason) = run.token.reason() {
            let cause = interruption_cause(&reason, name);
            info!(
                stage = name,
                reason = %reason.message,
                "Discarding stage result after cancellation"
            );
            run.emit(
                "stage.discarded",
                json!({ "stage": name, "succeeded": result.is_ok(), "duration_ms": duration_ms }),
            );
            run.emit(
                "pipeline.cancelled",
                json!({ "stage": name, "kind": cause.kind, "reason": reason.message }),
            );
            return Err(cause);
        }

        match result {
            Ok(output) => {
                run.completed.fetch_add(1, Ordering::SeqCst);
                run.emit(
                    "stage.completed",
                    json!({ "stage": name, "duration_ms": duration_ms }),
                );
                debug!(stage = name, duration_ms, "Stage completed");
                value = output;
            }
            Err(err) => {
                let cause = err.at_stage(name);
                warn!(
                    stage = name,
                    kind = %cause.kind,
                    error = %cause.message,
                    "Stage failed, skipping remaining stages"
                );
                run.emit(
                    "stage.failed",
                    json!({
                        "stage": name,
                        "kind": cause.kind,
                        "error": cause.message,
                        "duration_ms": duration_ms,
                    }),
                );
                run.emit(
                    "pipeline.failed",
                    json!({ "stage": name, "kind": cause.kind, "duration_ms": timer.elapsed_ms() }),
                );
                return Err(cause);
            }
        }
    }

    let duration_ms = timer.finish();
    info!(stages = pipeline.stages.len(), duration_ms, "Pipeline completed");
    run.emit("pipeline.completed", json!({ "duration_ms": duration_ms }));
    Ok(value)
}
