//! Pipeline configuration.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings a pipeline is built with.
///
/// ```json
/// { "name": "profile-sync", "timeout_ms": 2000, "log_events": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name, used in events and logs.
    pub name: String,
    /// Deadline armed for every invocation started with `run`. None means
    /// invocations wait as long as their stages take.
    pub timeout_ms: Option<u64>,
    /// Route events to `tracing` when no explicit sink is attached.
    pub log_events: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            timeout_ms: None,
            log_events: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a config with the given name and defaults otherwise.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields and
    /// [`ConfigError::InvalidValue`] for values that fail validation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks field values.
    ///
    /// # Errors
    ///
    /// Rejects an empty name and a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid_value("name", "must not be empty"));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "timeout_ms",
                "must be greater than zero; omit it to disable the deadline",
            ));
        }
        Ok(())
    }

    /// Returns the configured deadline.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Enables or disables event logging.
    #[must_use]
    pub fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }
}
