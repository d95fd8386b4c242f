//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared between an invocation handle and the
//! orchestrator. It is only consulted at stage boundaries.

mod token;

pub use token::{CallbackId, CancelCallback, CancelReason, CancellationToken};
