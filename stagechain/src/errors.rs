//! Error types for the stagechain framework.
//!
//! Two families live here:
//!
//! - Runtime failures ([`StageError`] reported by a stage, [`Cause`] surfaced
//!   to the caller). Both carry a [`FailureKind`] so callers can branch on it.
//! - Build-time and configuration errors ([`PipelineValidationError`],
//!   [`ConfigError`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Discriminates why a stage or invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The input did not resolve to a record. A domain outcome.
    NotFound,
    /// A collaborator's own infrastructure failed (network, storage, ...).
    Upstream,
    /// A deadline elapsed.
    Timeout,
    /// Cooperative cancellation was requested.
    Cancelled,
}

impl FailureKind {
    /// Returns true if a stage-level retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream | Self::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Upstream => write!(f, "upstream"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure reported by a stage implementation.
///
/// Stages do not name themselves in their errors; the orchestrator attaches
/// the origin when it turns a `StageError` into a [`Cause`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StageError {
    /// The failure kind.
    pub kind: FailureKind,
    /// Human-readable message, passed through to the caller unchanged.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    /// Creates an upstream (collaborator) error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Upstream, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Tags this error with the stage that produced it.
    #[must_use]
    pub fn at_stage(self, origin_stage: impl Into<String>) -> Cause {
        Cause {
            kind: self.kind,
            message: self.message,
            origin_stage: origin_stage.into(),
        }
    }
}

/// The terminal failure of an invocation.
///
/// `origin_stage` is always populated: a caller never receives an anonymous
/// "pipeline failed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("stage '{origin_stage}' failed ({kind}): {message}")]
pub struct Cause {
    /// The failure kind.
    pub kind: FailureKind,
    /// The message reported by the stage or the cancellation source.
    pub message: String,
    /// Name of the stage that produced (or was interrupted by) the failure.
    pub origin_stage: String,
}

impl Cause {
    /// Creates a new cause.
    #[must_use]
    pub fn new(
        kind: FailureKind,
        message: impl Into<String>,
        origin_stage: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            origin_stage: origin_stage.into(),
        }
    }

    /// Creates a cancellation cause at the given stage boundary.
    #[must_use]
    pub fn cancelled(message: impl Into<String>, origin_stage: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, message, origin_stage)
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-002-DUPLICATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

}

/// Error raised when a pipeline definition is rejected at build time.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Errors raised while loading a [`PipelineConfig`](crate::pipeline::PipelineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed.
    #[error("Invalid pipeline config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A field holds an unusable value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONTRACT-001-EMPTY_NAME" => Some(
                "Give every stage a non-empty name; failures are reported by stage name.",
            ),
            "CONTRACT-002-DUPLICATE" => Some(
                "Stage names must be unique within a pipeline so failure origins are unambiguous. \
                 Rename one of the stages.",
            ),
            _ => None,
        }
    }
}
