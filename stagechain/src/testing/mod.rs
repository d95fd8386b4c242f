//! Testing utilities for stagechain pipelines.
//!
//! Available to downstream crates with the `testing` feature:
//! - Stages that record, fail, sleep or block on a gate
//! - Assertions over [`Outcome`](crate::Outcome)s

mod assertions;
mod mocks;

pub use assertions::{assert_call_order, assert_failed_with, assert_not_called, assert_succeeded};
pub use mocks::{CallLog, FailingStage, GateHandle, GateStage, RecordingStage, SlowStage};
