//! Handles to running invocations.

use super::definition::{downcast_output, Payload, PipelineInner};
use super::orchestrator::{self, interruption_cause, RunState};
use crate::cancellation::{CallbackId, CancellationToken};
use crate::core::InvocationStatus;
use crate::errors::{Cause, FailureKind};
use crate::Outcome;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, warn, Instrument};
use uuid::Uuid;

/// State shared between a handle, its orchestrator task and its timer.
struct InvocationShared<O> {
    run: RunState,
    outcome: Mutex<Option<Outcome<O>>>,
    settled: AtomicBool,
    notify: Notify,
    cancel_callback: Mutex<Option<CallbackId>>,
}

impl<O> InvocationShared<O> {
    fn new(run: RunState) -> Self {
        Self {
            run,
            outcome: Mutex::new(None),
            settled: AtomicBool::new(false),
            notify: Notify::new(),
            cancel_callback: Mutex::new(None),
        }
    }

    /// Stores the outcome. The first writer wins; later calls return false.
    fn settle(&self, outcome: Outcome<O>) -> bool {
        {
            let mut slot = self.outcome.lock();
            if self.settled.load(Ordering::SeqCst) {
                return false;
            }
            let status = match &outcome {
                Ok(_) => InvocationStatus::Succeeded,
                Err(cause) => InvocationStatus::from_failure(cause.kind),
            };
            self.run.finish(status);
            *slot = Some(outcome);
            self.settled.store(true, Ordering::SeqCst);
        }
        // A shared token outlives this invocation.
        if let Some(id) = self.cancel_callback.lock().take() {
            self.run.token.remove_callback(id);
        }
        self.notify.notify_waiters();
        true
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    async fn settled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }

    fn take(&self) -> Option<Outcome<O>> {
        self.outcome.lock().take()
    }

    /// Trips the token and settles with a `Timeout` attributed to the stage
    /// that was interrupted.
    fn expire(&self, deadline: Duration) {
        self.run.token.expire(format!(
            "deadline of {}ms elapsed",
            deadline.as_millis()
        ));
        // The token may already carry an earlier cancel; that reason stands.
        let Some(reason) = self.run.token.reason() else {
            return;
        };
        let cause = interruption_cause(&reason, self.run.interrupted_stage());
        if self.settle(Err(cause.clone())) {
            warn!(
                stage = %cause.origin_stage,
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "Invocation deadline elapsed"
            );
            self.run.emit(
                "pipeline.cancelled",
                json!({
                    "stage": cause.origin_stage,
                    "kind": cause.kind,
                    "reason": cause.message,
                }),
            );
        }
    }
}

/// Starts the orchestrator for one invocation on the ambient runtime.
pub(crate) fn spawn<O>(
    pipeline: Arc<PipelineInner>,
    input: Payload,
    token: Arc<CancellationToken>,
) -> Invocation<O>
where
    O: Send + 'static,
{
    let shared = Arc::new(InvocationShared::new(RunState::new(pipeline, token)));
    let span = shared.run.span();

    let weak = Arc::downgrade(&shared);
    let callback = shared.run.token.on_cancel(move |reason| {
        if let Some(shared) = weak.upgrade() {
            shared.run.emit(
                "pipeline.cancel_requested",
                json!({ "kind": reason.kind, "reason": reason.message }),
            );
        }
    });
    *shared.cancel_callback.lock() = Some(callback);

    let task = shared.clone();
    tokio::spawn(
        async move {
            let run = &task.run;
            let outcome = match AssertUnwindSafe(orchestrator::drive(run, input))
                .catch_unwind()
                .await
            {
                Ok(result) => result.and_then(|payload| downcast_output(&run.pipeline, payload)),
                Err(_) => {
                    let origin = run.interrupted_stage();
                    error!(stage = %origin, "Stage panicked");
                    run.emit("pipeline.failed", json!({ "stage": origin, "kind": FailureKind::Upstream }));
                    Err(Cause::new(FailureKind::Upstream, "stage panicked", origin))
                }
            };
            task.settle(outcome);
        }
        .instrument(span),
    );

    if let Some(deadline) = shared.run.pipeline.config.timeout() {
        let timer = shared.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(deadline, timer.settled()).await.is_err() {
                timer.expire(deadline);
            }
        });
    }

    Invocation { shared }
}

/// A handle to one running invocation.
///
/// Awaiting the handle (or calling [`wait`](Self::wait)) yields the outcome.
/// Dropping it does not cancel the invocation; the orchestrator keeps running
/// until its own settlement.
pub struct Invocation<O> {
    shared: Arc<InvocationShared<O>>,
}

impl<O> std::fmt::Debug for Invocation<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.shared.run.invocation_id)
            .field("pipeline", &self.shared.run.pipeline.name)
            .field("status", &self.shared.run.status())
            .finish()
    }
}

impl<O: Send + 'static> Invocation<O> {
    /// Returns the invocation id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.run.invocation_id
    }

    /// Returns the name of the pipeline being run.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.shared.run.pipeline.name
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> InvocationStatus {
        self.shared.run.status()
    }

    /// Returns true once an outcome has been stored.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Returns the stage in flight, if any.
    #[must_use]
    pub fn current_stage(&self) -> Option<String> {
        self.shared.run.current_stage()
    }

    /// Returns how many stages have settled successfully.
    #[must_use]
    pub fn stages_completed(&self) -> usize {
        self.shared.run.stages_completed()
    }

    /// Returns the token this invocation observes.
    #[must_use]
    pub fn token(&self) -> Arc<CancellationToken> {
        self.shared.run.token.clone()
    }

    /// Requests cooperative cancellation.
    ///
    /// The stage in flight runs to completion and its result is discarded.
    /// Returns true if this call tripped the token.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.shared.run.token.cancel(reason)
    }

    /// Waits for the outcome.
    pub async fn wait(self) -> Outcome<O> {
        self.shared.settled().await;
        self.take_outcome()
    }

    /// Waits for the outcome for at most `deadline`.
    ///
    /// When the deadline wins, the invocation is settled with a `Timeout`
    /// whose origin is the stage in flight, and that cause is returned
    /// immediately. The stage itself keeps running in the background; no
    /// further stage starts.
    pub async fn wait_timeout(self, deadline: Duration) -> Outcome<O> {
        if tokio::time::timeout(deadline, self.shared.settled())
            .await
            .is_err()
        {
            self.shared.expire(deadline);
        }
        self.take_outcome()
    }

    fn take_outcome(&self) -> Outcome<O> {
        self.shared.take().unwrap_or_else(|| {
            Err(Cause::cancelled(
                "outcome was already consumed",
                self.shared.run.interrupted_stage(),
            ))
        })
    }
}

impl<O: Send + 'static> IntoFuture for Invocation<O> {
    type Output = Outcome<O>;
    type IntoFuture = BoxFuture<'static, Outcome<O>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}
