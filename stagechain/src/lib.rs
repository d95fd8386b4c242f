//! # Stagechain
//!
//! Sequential async stage pipelines.
//!
//! A pipeline is an ordered list of stages. Each stage consumes the previous
//! stage's output and either produces a value for the next one or fails.
//! Stagechain provides:
//!
//! - **Typed chaining**: a stage's input must match the previous output at
//!   compile time
//! - **Short-circuiting**: the first failure ends the run, tagged with the
//!   stage it came from
//! - **Invocation handles**: await, cooperative cancellation, deadlines and a
//!   query surface for each run
//! - **Event-driven observability**: lifecycle events plus `tracing` spans
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagechain::prelude::*;
//!
//! let pipeline = PipelineBuilder::<String, String>::new("profile-sync")
//!     .stage(LookupStage::new(store))?
//!     .stage(EnrichStage::new(enricher))?
//!     .stage(CacheWriteStage::new(cache))?
//!     .stage(NotifyStage::new(notifier))?
//!     .build();
//!
//! let report = pipeline.run("user-1".to_string()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod profile_sync;
pub mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::Cause;
pub use pipeline::run_pipeline;

/// The settled result of an invocation: the final stage's value or the first
/// failure.
pub type Outcome<T> = Result<T, Cause>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelReason, CancellationToken};
    pub use crate::core::{InvocationStatus, StageKind};
    pub use crate::errors::{
        Cause, ConfigError, ContractErrorInfo, FailureKind, PipelineValidationError, StageError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::observability::{init_tracing, LogFormat, ObservabilityConfig};
    pub use crate::pipeline::{run_pipeline, Invocation, Pipeline, PipelineBuilder, PipelineConfig};
    pub use crate::profile_sync::{
        profile_sync_pipeline, CacheWriteStage, EnrichStage, LookupStage, NotifyStage, SyncReport,
    };
    pub use crate::stages::{FnStage, RetryConfig, Retrying, Stage};
    pub use crate::Outcome;
}
