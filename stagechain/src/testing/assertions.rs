//! Test assertions for invocation outcomes.

use super::CallLog;
use crate::errors::FailureKind;
use crate::Outcome;
use std::fmt::Debug;

/// Asserts that the outcome is a success.
pub fn assert_succeeded<T: Debug>(outcome: &Outcome<T>) {
    assert!(outcome.is_ok(), "Expected success, got: {outcome:?}");
}

/// Asserts that the outcome failed with `kind`, originating at `origin`.
pub fn assert_failed_with<T: Debug>(outcome: &Outcome<T>, kind: FailureKind, origin: &str) {
    match outcome {
        Ok(value) => panic!("Expected {kind} failure from '{origin}', got success: {value:?}"),
        Err(cause) => {
            assert_eq!(cause.kind, kind, "Unexpected failure kind: {cause}");
            assert_eq!(cause.origin_stage, origin, "Unexpected origin: {cause}");
        }
    }
}

/// Asserts that exactly `expected` stages were invoked, in that order.
pub fn assert_call_order(log: &CallLog, expected: &[&str]) {
    assert_eq!(log.calls(), expected, "Unexpected stage call order");
}

/// Asserts that `stage` was never invoked.
pub fn assert_not_called(log: &CallLog, stage: &str) {
    assert_eq!(
        log.count(stage),
        0,
        "Stage '{stage}' was invoked; calls: {:?}",
        log.calls()
    );
}
