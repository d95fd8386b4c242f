//! Typed pipeline builder.

use super::definition::{Erased, ErasedStage, Pipeline, PipelineInner};
use super::PipelineConfig;
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
use crate::stages::Stage;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Pipeline`]s.
///
/// `O` tracks the output type of the last stage added, so each new stage
/// must accept exactly what the previous one produces.
///
/// ```ignore
/// let pipeline = PipelineBuilder::<String, _>::new("profile-sync")
///     .stage(LookupStage::new(store))?
///     .stage(EnrichStage::new(enricher))?
///     .build();
/// ```
pub struct PipelineBuilder<I, O> {
    config: PipelineConfig,
    stages: Vec<Arc<dyn ErasedStage>>,
    event_sink: Option<Arc<dyn EventSink>>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> std::fmt::Debug for PipelineBuilder<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<I: Send + 'static> PipelineBuilder<I, I> {
    /// Creates an empty builder. An empty pipeline returns its input.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(PipelineConfig::new(name))
    }

    /// Creates an empty builder from a loaded configuration.
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            event_sink: None,
            _types: PhantomData,
        }
    }
}

impl<I, O> PipelineBuilder<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage name is empty or already used in this
    /// pipeline.
    pub fn stage<S>(self, stage: S) -> Result<PipelineBuilder<I, S::Output>, PipelineValidationError>
    where
        S: Stage<Input = O> + 'static,
    {
        let name = stage.name().to_string();

        if name.trim().is_empty() {
            return Err(validation_error(
                "CONTRACT-001-EMPTY_NAME",
                format!("Stage #{} has an empty name", self.stages.len() + 1),
                "Stage name must not be empty",
                Vec::new(),
            ));
        }

        if self.stages.iter().any(|s| s.name() == name) {
            return Err(validation_error(
                "CONTRACT-002-DUPLICATE",
                format!("Stage '{name}' is already part of pipeline '{}'", self.config.name),
                format!("Duplicate stage name '{name}'"),
                vec![name],
            ));
        }

        let mut stages = self.stages;
        stages.push(Arc::new(Erased(stage)));

        Ok(PipelineBuilder {
            config: self.config,
            stages,
            event_sink: self.event_sink,
            _types: PhantomData,
        })
    }

    /// Attaches an event sink. Overrides `log_events`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Arms a deadline for every invocation started with `run`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Freezes the stage list into a reusable pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline<I, O> {
        let event_sink = self.event_sink.unwrap_or_else(|| {
            if self.config.log_events {
                Arc::new(LoggingEventSink::debug())
            } else {
                Arc::new(NoOpEventSink)
            }
        });

        Pipeline::from_inner(PipelineInner {
            name: self.config.name.clone(),
            stages: self.stages,
            event_sink,
            config: self.config,
        })
    }
}

fn validation_error(
    code: &str,
    message: String,
    summary: impl Into<String>,
    stages: Vec<String>,
) -> PipelineValidationError {
    let mut info = ContractErrorInfo::new(code, summary);
    if let Some(hint) = ContractSuggestions::get(code) {
        info = info.with_fix_hint(hint);
    }
    PipelineValidationError::new(message)
        .with_stages(stages)
        .with_error_info(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use crate::errors::StageError;
    use crate::stages::FnStage;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::<u32, u32>::new("numbers");

        assert_eq!(builder.name(), "numbers");
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_builder_chains_types() {
        let pipeline = PipelineBuilder::<u32, u32>::new("numbers")
            .stage(FnStage::new("to-string", |x: u32| async move { Ok(x.to_string()) }))
            .unwrap()
            .stage(
                FnStage::new("length", |s: String| async move { Ok(s.len()) })
                    .with_kind(StageKind::Transform),
            )
            .unwrap()
            .build();

        assert_eq!(pipeline.stage_names(), vec!["to-string", "length"]);
        assert_eq!(pipeline.len(), 2);
        assert!(!pipeline.is_empty());
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        let err = PipelineBuilder::<u32, u32>::new("numbers")
            .stage(FnStage::new(" ", |x: u32| async move { Ok::<_, StageError>(x) }))
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-001-EMPTY_NAME"));
        assert!(err.error_info.unwrap().fix_hint.is_some());
    }

    #[test]
    fn test_builder_rejects_duplicate_name() {
        let err = PipelineBuilder::<u32, u32>::new("numbers")
            .stage(FnStage::new("inc", |x: u32| async move { Ok(x + 1) }))
            .unwrap()
            .stage(FnStage::new("inc", |x: u32| async move { Ok(x + 1) }))
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-002-DUPLICATE"));
        assert_eq!(err.stages, vec!["inc".to_string()]);
        assert!(err.message.contains("numbers"));
    }

    #[test]
    fn test_builder_empty_build_is_allowed() {
        let pipeline = PipelineBuilder::<u32, u32>::new("identity").build();

        assert!(pipeline.is_empty());
        assert_eq!(pipeline.config().timeout(), None);
    }

    #[test]
    fn test_builder_with_timeout_and_config() {
        let config = PipelineConfig::new("from-config").with_log_events(true);
        let builder = PipelineBuilder::<u32, u32>::from_config(config)
            .with_timeout(Duration::from_millis(150));

        assert_eq!(builder.name(), "from-config");
        let pipeline = builder.build();
        assert_eq!(pipeline.config().timeout_ms, Some(150));
        assert!(pipeline.config().log_events);
    }
}
