//! Stage-level retries with configurable backoff and jitter.
//!
//! The orchestrator never retries. A stage that talks to a flaky
//! collaborator can be wrapped in [`Retrying`], which re-invokes it on
//! transient failures (`Upstream`, `Timeout`) only.

use super::Stage;
use crate::core::StageKind;
use crate::errors::StageError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// State tracking for one retried call.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Number of retries already scheduled (0 before the first retry).
    pub attempt: usize,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `max_attempts` calls have been made.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt + 1 >= config.max_attempts
    }

    /// Calculates the delay before the next retry.
    #[must_use]
    pub fn calculate_delay(&self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = u32::try_from(self.attempt).unwrap_or(u32::MAX);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(attempt)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=delay - half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Wraps a stage and retries its transient failures.
#[derive(Debug)]
pub struct Retrying<S> {
    inner: S,
    config: RetryConfig,
}

impl<S> Retrying<S> {
    /// Wraps `inner` with the given retry policy.
    #[must_use]
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl<S> Stage for Retrying<S>
where
    S: Stage,
    S::Input: Clone,
{
    type Input = S::Input;
    type Output = S::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> StageKind {
        self.inner.kind()
    }

    async fn invoke(&self, input: Self::Input) -> Result<Self::Output, StageError> {
        let mut state = RetryState::new();

        loop {
            match self.inner.invoke(input.clone()).await {
                Ok(output) => return Ok(output),
                Err(err) if err.kind.is_transient() && !state.is_exhausted(&self.config) => {
                    let delay = state.calculate_delay(&self.config);
                    state.attempt += 1;
                    debug!(
                        stage = self.inner.name(),
                        attempt = state.attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying stage after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::stages::FnStage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn no_delay(max_attempts: usize) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(0)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30000);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter_strategy, JitterStrategy::Full);
    }

    #[test]
    fn test_retry_config_deserialize_partial() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 5, "backoff_strategy": "linear"}"#).unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_delay_exponential_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        assert_eq!(state.calculate_delay(&config), Duration::from_millis(100));
        state.attempt = 1;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(200));
        state.attempt = 2;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_linear_and_constant() {
        let linear = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        let constant = linear.clone().with_backoff(BackoffStrategy::Constant);
        let state = RetryState { attempt: 2 };

        assert_eq!(state.calculate_delay(&linear), Duration::from_millis(300));
        assert_eq!(state.calculate_delay(&constant), Duration::from_millis(100));
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(JitterStrategy::None);
        let state = RetryState { attempt: 10 };

        assert_eq!(state.calculate_delay(&config), Duration::from_millis(5000));
    }

    #[test]
    fn test_calculate_delay_jitter_bounds() {
        let full = RetryConfig::new().with_base_delay_ms(100).with_jitter(JitterStrategy::Full);
        let equal = full.clone().with_jitter(JitterStrategy::Equal);
        let state = RetryState::new();

        for _ in 0..50 {
            assert!(state.calculate_delay(&full) <= Duration::from_millis(100));
            let d = state.calculate_delay(&equal);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_equal_jitter_reaches_odd_delay() {
        let config = RetryConfig::new()
            .with_base_delay_ms(3)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Equal);
        let state = RetryState::new();

        let delays: Vec<Duration> = (0..200).map(|_| state.calculate_delay(&config)).collect();

        assert!(delays
            .iter()
            .all(|d| *d >= Duration::from_millis(1) && *d <= Duration::from_millis(3)));
        assert!(delays.contains(&Duration::from_millis(3)));
    }

    #[tokio::test]
    async fn test_retrying_recovers_from_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let flaky = FnStage::new("enrich", move |x: u32| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StageError::upstream("connection reset"))
                } else {
                    Ok(x + 1)
                }
            }
        });

        let stage = Retrying::new(flaky, no_delay(3));

        assert_eq!(stage.invoke(1).await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(stage.name(), "enrich");
    }

    #[tokio::test]
    async fn test_retrying_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let broken = FnStage::new("enrich", move |_x: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<u32, _>(StageError::timeout("collaborator timed out")) }
        });

        let err = Retrying::new(broken, no_delay(2)).invoke(1).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrying_skips_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lookup = FnStage::new("lookup", move |_id: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<u32, _>(StageError::not_found("User not found")) }
        });

        let err = Retrying::new(lookup, no_delay(5)).invoke(7).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
