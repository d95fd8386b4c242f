//! Stages for exercising the orchestrator in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::errors::StageError;
use crate::stages::Stage;

/// Records stage invocations in the order they happen.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call to `stage`.
    pub fn record(&self, stage: &str) {
        self.calls.lock().push(stage.to_string());
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many times `stage` was called.
    #[must_use]
    pub fn count(&self, stage: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == stage).count()
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing was called.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// A stage that passes its input through and records the call.
pub struct RecordingStage<T> {
    name: String,
    log: CallLog,
    _value: PhantomData<fn(T) -> T>,
}

impl<T> RecordingStage<T> {
    /// Creates a new recording stage writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RecordingStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Stage for RecordingStage<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: T) -> Result<T, StageError> {
        self.log.record(&self.name);
        Ok(input)
    }
}

/// A stage that always fails with the same error.
pub struct FailingStage<I, O> {
    name: String,
    error: StageError,
    log: CallLog,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> FailingStage<I, O> {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: StageError, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            error,
            log: log.clone(),
            _types: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for FailingStage<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingStage")
            .field("name", &self.name)
            .field("error", &self.error)
            .finish()
    }
}

#[async_trait]
impl<I: Send + 'static, O: Send + 'static> Stage for FailingStage<I, O> {
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _input: I) -> Result<O, StageError> {
        self.log.record(&self.name);
        Err(self.error.clone())
    }
}

/// A pass-through stage that takes time to execute.
pub struct SlowStage<T> {
    name: String,
    delay: Duration,
    log: CallLog,
    completed: Arc<AtomicBool>,
    _value: PhantomData<fn(T) -> T>,
}

impl<T> SlowStage<T> {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            delay,
            log: log.clone(),
            completed: Arc::new(AtomicBool::new(false)),
            _value: PhantomData,
        }
    }

    /// Returns a flag that is set once the delay has elapsed.
    #[must_use]
    pub fn completed_flag(&self) -> Arc<AtomicBool> {
        self.completed.clone()
    }
}

impl<T> fmt::Debug for SlowStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowStage")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Stage for SlowStage<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: T) -> Result<T, StageError> {
        self.log.record(&self.name);
        tokio::time::sleep(self.delay).await;
        self.completed.store(true, Ordering::SeqCst);
        Ok(input)
    }
}

#[derive(Debug, Default)]
struct Gate {
    entered: Notify,
    release: Notify,
    completed: AtomicBool,
}

/// A pass-through stage that blocks until released from the test.
///
/// Lets a test act while the stage is known to be in flight.
pub struct GateStage<T> {
    name: String,
    log: CallLog,
    gate: Arc<Gate>,
    error: Option<StageError>,
    _value: PhantomData<fn(T) -> T>,
}

/// Test-side control of a [`GateStage`].
#[derive(Debug, Clone)]
pub struct GateHandle {
    gate: Arc<Gate>,
}

impl<T> GateStage<T> {
    /// Creates a new gate stage.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            gate: Arc::new(Gate::default()),
            error: None,
            _value: PhantomData,
        }
    }

    /// Makes the stage fail with `error` once released.
    #[must_use]
    pub fn failing_with(mut self, error: StageError) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns a handle for driving the gate.
    #[must_use]
    pub fn handle(&self) -> GateHandle {
        GateHandle {
            gate: self.gate.clone(),
        }
    }
}

impl GateHandle {
    /// Waits until the stage has been entered.
    pub async fn entered(&self) {
        self.gate.entered.notified().await;
    }

    /// Lets the stage finish.
    pub fn release(&self) {
        self.gate.release.notify_one();
    }

    /// Returns true once the stage has finished its work.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.gate.completed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for GateStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Stage for GateStage<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: T) -> Result<T, StageError> {
        self.log.record(&self.name);
        self.gate.entered.notify_one();
        self.gate.release.notified().await;
        self.gate.completed.store(true, Ordering::SeqCst);
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;

    #[tokio::test]
    async fn test_recording_stage() {
        let log = CallLog::new();
        let stage = RecordingStage::<u32>::new("record", &log);

        assert_eq!(stage.invoke(5).await, Ok(5));
        assert_eq!(log.calls(), vec!["record".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let log = CallLog::new();
        let stage = FailingStage::<u32, String>::new("enrich", StageError::upstream("boom"), &log);

        let err = stage.invoke(1).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Upstream);
        assert_eq!(log.count("enrich"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage_sets_completed() {
        let log = CallLog::new();
        let stage = SlowStage::<u32>::new("slow", Duration::from_secs(5), &log);
        let completed = stage.completed_flag();

        assert_eq!(stage.invoke(3).await, Ok(3));
        assert!(completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_gate_stage_waits_for_release() {
        let log = CallLog::new();
        let stage = Arc::new(GateStage::<u32>::new("gate", &log));
        let handle = stage.handle();

        let task = tokio::spawn({
            let stage = stage.clone();
            async move { stage.invoke(9).await }
        });

        handle.entered().await;
        assert!(!handle.completed());
        handle.release();

        assert_eq!(task.await.unwrap(), Ok(9));
        assert!(handle.completed());
    }
}
