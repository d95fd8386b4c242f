//! Stage kind and invocation status enums.

use crate::errors::FailureKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs. Descriptive only: it shows up in
/// events and logs and never changes how the orchestrator treats the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Resolves an input key to a record (e.g., database lookup).
    Lookup,
    /// Reshapes data without touching collaborators.
    #[default]
    Transform,
    /// Adds information from an external service.
    Enrich,
    /// Writes to a store or cache.
    Persist,
    /// Sends a message to the outside world.
    Notify,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "lookup"),
            Self::Transform => write!(f, "transform"),
            Self::Enrich => write!(f, "enrich"),
            Self::Persist => write!(f, "persist"),
            Self::Notify => write!(f, "notify"),
        }
    }
}

/// Lifecycle state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// Created, no stage started yet.
    #[default]
    Pending,
    /// A stage is in flight.
    Running,
    /// Settled with the final stage's value.
    Succeeded,
    /// Settled with a `NotFound` or `Upstream` cause.
    Failed,
    /// Settled with a `Cancelled` cause.
    Cancelled,
    /// Settled with a `Timeout` cause.
    TimedOut,
}

impl InvocationStatus {
    /// Maps a failure kind to the terminal status it produces.
    #[must_use]
    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::NotFound | FailureKind::Upstream => Self::Failed,
            FailureKind::Timeout => Self::TimedOut,
            FailureKind::Cancelled => Self::Cancelled,
        }
    }

    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}
