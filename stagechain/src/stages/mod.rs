//! Stage trait and implementations.
//!
//! A stage is one asynchronous step: it takes an input value and produces
//! either an output value or a [`StageError`]. Stages are chained by
//! [`PipelineBuilder`](crate::pipeline::PipelineBuilder), which requires each
//! stage's `Input` to match the previous stage's `Output`.

mod retry;

pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryState, Retrying};

use crate::core::StageKind;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// An implementation resolves exactly once per call. Side effects (writing a
/// cache entry, sending a notification) are the stage's own business; the
/// orchestrator only looks at the returned `Result`.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The value this stage consumes.
    type Input: Send + 'static;
    /// The value this stage produces.
    type Output: Send + 'static;

    /// Returns the name of the stage. Used as the origin of its failures.
    fn name(&self) -> &str;

    /// Returns the kind of work the stage performs.
    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    /// Invokes the stage.
    ///
    /// # Arguments
    ///
    /// * `input` - The previous stage's output (or the pipeline input)
    async fn invoke(&self, input: Self::Input) -> Result<Self::Output, StageError>;
}

#[async_trait]
impl<S: Stage> Stage for Arc<S> {
    type Input = S::Input;
    type Output = S::Output;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> StageKind {
        (**self).kind()
    }

    async fn invoke(&self, input: Self::Input) -> Result<Self::Output, StageError> {
        (**self).invoke(input).await
    }
}

/// An async function-based stage.
pub struct FnStage<I, O, F, Fut> {
    name: String,
    kind: StageKind,
    func: F,
    _phantom: PhantomData<fn(I) -> (O, Fut)>,
}

impl<I, O, F, Fut> FnStage<I, O, F, Fut>
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, StageError>> + Send,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::default(),
            func,
            _phantom: PhantomData,
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<I, O, F, Fut> Debug for FnStage<I, O, F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl<I, O, F, Fut> Stage for FnStage<I, O, F, Fut>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, StageError>> + Send,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn invoke(&self, input: I) -> Result<O, StageError> {
        (self.func)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("double", |x: u32| async move { Ok(x * 2) });

        assert_eq!(stage.name(), "double");
        assert_eq!(stage.kind(), StageKind::Transform);
        assert_eq!(stage.invoke(21).await, Ok(42));
    }

    #[tokio::test]
    async fn test_fn_stage_failure() {
        let stage = FnStage::new("lookup", |_id: String| async move {
            Err::<u32, _>(StageError::not_found("User not found"))
        })
        .with_kind(StageKind::Lookup);

        let err = stage.invoke("missing".to_string()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert_eq!(stage.kind(), StageKind::Lookup);
    }

    #[tokio::test]
    async fn test_arc_stage_delegates() {
        let stage = Arc::new(FnStage::new("inc", |x: i64| async move { Ok(x + 1) }));
        let shared = stage.clone();

        assert_eq!(Stage::name(&shared), "inc");
        assert_eq!(shared.invoke(1).await, Ok(2));
    }
}
