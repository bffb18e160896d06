//! Cooperative cancellation shared by every layer of a sync run.
//!
//! A [`CancelSignal`] is a one-way "stop" flag. It is set either explicitly
//! (Ctrl+C, caller abort) or by an attached deadline, and is observed at
//! every suspension point: attempt start, in-flight requests, backoff sleep,
//! work-queue claim and result hand-off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

/// Shared handle to a cancellation signal.
pub type SharedCancel = Arc<CancelSignal>;

/// Idempotent stop indicator for one run.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create a signal that is not yet cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared signal wrapped in [`Arc`].
    pub fn shared() -> SharedCancel {
        Arc::new(Self::new())
    }

    /// Create a shared signal that cancels itself once `deadline` elapses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_deadline(deadline: Duration) -> SharedCancel {
        let signal = Self::shared();
        let watcher = Arc::downgrade(&signal);
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Some(signal) = watcher.upgrade() {
                if !signal.is_cancelled() {
                    warn!(deadline_secs = deadline.as_secs_f64(), "Run deadline expired");
                }
                signal.cancel();
            }
        });
        signal
    }

    /// Set the signal. Wakes all waiters exactly once.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether the signal has been set.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the signal is set. Returns immediately if already set.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a concurrent
        // `cancel()` between the check and the await is not lost.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Sleep for `duration`, returning `false` if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }
}
