//! Core domain model types for stagechain.
//!
//! - Stage kind tags
//! - Invocation status reported by the query surface

mod status;

pub use status::{InvocationStatus, StageKind};
