//! Cancellation token for cooperative cancellation.

use crate::errors::FailureKind;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn FnOnce(&CancelReason) + Send>;

/// Identifies a callback registered with [`CancellationToken::on_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Why a token was tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// Either [`FailureKind::Cancelled`] or [`FailureKind::Timeout`].
    pub kind: FailureKind,
    /// Free-form message supplied by whoever tripped the token.
    pub message: String,
}

impl CancelReason {
    /// Returns true if the token was tripped by a deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

/// A token for cooperative cancellation.
///
/// The orchestrator polls it at stage boundaries; nothing is interrupted
/// mid-stage. Tripping is idempotent and only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<CancelReason>>,
    /// Callbacks to invoke on cancellation.
    callbacks: Mutex<Vec<(CallbackId, CancelCallback)>>,
    next_callback: AtomicU64,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Returns true if this call tripped the token.
    pub fn cancel(&self, message: impl Into<String>) -> bool {
        self.trip(FailureKind::Cancelled, message.into())
    }

    /// Trips the token because a deadline elapsed.
    ///
    /// Returns true if this call tripped the token.
    pub fn expire(&self, message: impl Into<String>) -> bool {
        self.trip(FailureKind::Timeout, message.into())
    }

    fn trip(&self, kind: FailureKind, message: String) -> bool {
        let reason = {
            let mut slot = self.reason.write();
            if slot.is_some() {
                return false;
            }
            let reason = CancelReason { kind, message };
            *slot = Some(reason.clone());
            // Published under the lock so `reason()` is never None once this reads true.
            self.cancelled.store(true, Ordering::SeqCst);
            reason
        };

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for (_, callback) in callbacks {
            run_callback(callback, &reason);
        }
        true
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately. Long-lived
    /// tokens should pair this with [`remove_callback`](Self::remove_callback)
    /// once the callback is no longer wanted.
    pub fn on_cancel<F>(&self, callback: F) -> CallbackId
    where
        F: FnOnce(&CancelReason) + Send + 'static,
    {
        let id = CallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed));
        let mut callbacks = self.callbacks.lock();
        if let Some(reason) = self.reason() {
            drop(callbacks);
            run_callback(Box::new(callback), &reason);
        } else {
            callbacks.push((id, Box::new(callback)));
        }
        id
    }

    /// Drops a pending callback without running it.
    ///
    /// Returns false if the callback already ran or was already removed.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }

    /// Returns the number of callbacks waiting for cancellation.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.read().clone()
    }
}

fn run_callback(callback: CancelCallback, reason: &CancelReason) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        callback(reason);
    })) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}
