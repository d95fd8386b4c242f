//! Immutable pipeline definitions.

use super::invocation::{self, Invocation};
use super::orchestrator::{self, RunState};
use super::PipelineConfig;
use crate::cancellation::CancellationToken;
use crate::core::StageKind;
use crate::errors::{Cause, FailureKind, StageError};
use crate::events::{EventSink, PipelineEvent};
use crate::stages::Stage;
use crate::Outcome;
use async_trait::async_trait;
use std::any::{type_name, Any};
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::Instrument;

/// A value travelling between stages with its concrete type erased.
pub(crate) type Payload = Box<dyn Any + Send>;

/// Object-safe view of a [`Stage`] used by the orchestrator loop.
#[async_trait]
pub(crate) trait ErasedStage: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> StageKind;

    async fn invoke_erased(&self, input: Payload) -> Result<Payload, StageError>;
}

#[derive(Debug)]
pub(crate) struct Erased<S>(pub(crate) S);

#[async_trait]
impl<S: Stage> ErasedStage for Erased<S> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn kind(&self) -> StageKind {
        self.0.kind()
    }

    async fn invoke_erased(&self, input: Payload) -> Result<Payload, StageError> {
        // The typed builder makes this unreachable through the public API.
        let input = input.downcast::<S::Input>().map_err(|_| {
            StageError::upstream(format!(
                "stage received a payload that is not {}",
                type_name::<S::Input>()
            ))
        })?;
        let output: Payload = Box::new(self.0.invoke(*input).await?);
        Ok(output)
    }
}

/// Shared, immutable state behind every clone of a [`Pipeline`].
pub(crate) struct PipelineInner {
    pub(crate) name: String,
    pub(crate) stages: Vec<Arc<dyn ErasedStage>>,
    pub(crate) event_sink: Arc<dyn EventSink>,
    pub(crate) config: PipelineConfig,
}

impl PipelineInner {
    pub(crate) fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        self.event_sink.try_emit(event);
    }
}

impl Debug for PipelineInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInner")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish()
    }
}

/// An ordered, immutable sequence of stages turning an `I` into an `O`.
///
/// Built once with [`PipelineBuilder`](super::PipelineBuilder) and reused
/// across any number of concurrent invocations. Cloning is cheap.
pub struct Pipeline<I, O> {
    inner: Arc<PipelineInner>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _types: PhantomData,
        }
    }
}

impl<I, O> Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.inner.name)
            .field("stages", &self.inner.stage_names())
            .finish()
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub(crate) fn from_inner(inner: PipelineInner) -> Self {
        Self {
            inner: Arc::new(inner),
            _types: PhantomData,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<String> {
        self.inner.stage_names()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.stages.len()
    }

    /// Returns true for the identity pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.stages.is_empty()
    }

    /// Returns the configuration the pipeline was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Starts one invocation on the ambient tokio runtime.
    ///
    /// If the configuration carries a timeout, a deadline is armed for it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn run(&self, input: I) -> Invocation<O> {
        self.run_with_token(input, Arc::new(CancellationToken::new()))
    }

    /// Starts one invocation that observes an externally owned token.
    pub fn run_with_token(&self, input: I, token: Arc<CancellationToken>) -> Invocation<O> {
        invocation::spawn(self.inner.clone(), Box::new(input), token)
    }

    /// Runs the pipeline to completion on the caller's task.
    ///
    /// No handle is created and no configured deadline applies.
    pub async fn execute(&self, input: I) -> Outcome<O> {
        self.execute_with_token(input, Arc::new(CancellationToken::new()))
            .await
    }

    /// Like [`execute`](Self::execute), observing an externally owned token.
    pub async fn execute_with_token(&self, input: I, token: Arc<CancellationToken>) -> Outcome<O> {
        let run = RunState::new(self.inner.clone(), token);
        let span = run.span();
        let payload = orchestrator::drive(&run, Box::new(input))
            .instrument(span)
            .await;
        payload.and_then(|p| downcast_output(&self.inner, p))
    }
}

/// Recovers the typed output of the final stage.
pub(crate) fn downcast_output<O: 'static>(pipeline: &PipelineInner, payload: Payload) -> Outcome<O> {
    payload.downcast::<O>().map(|output| *output).map_err(|_| {
        let origin = pipeline
            .stages
            .last()
            .map_or_else(|| pipeline.name.clone(), |s| s.name().to_string());
        Cause::new(
            FailureKind::Upstream,
            format!("final payload is not {}", type_name::<O>()),
            origin,
        )
    })
}

/// Starts one invocation of `pipeline` against `input`.
///
/// Equivalent to [`Pipeline::run`].
pub fn run_pipeline<I, O>(pipeline: &Pipeline<I, O>, input: I) -> Invocation<O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pipeline.run(input)
}
