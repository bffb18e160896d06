//! Bounded retry with exponential backoff
//!
//! [`Backoff::execute`] knows nothing about HTTP or pagination: the action's
//! error type classifies itself through [`Classify`].

use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::config::RetryPolicy;
use crate::metrics::record_retry_backoff;

/// Outcome classification for errors produced by a retried action.
pub trait Classify {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// The error reported when the cancellation signal stops the executor.
    fn cancelled() -> Self;
}

/// Retry executor
#[derive(Debug, Clone, Copy, Default)]
pub struct Backoff {
    policy: RetryPolicy,
}

impl Backoff {
    /// Create an executor for the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `action` up to `max_retries + 1` times.
    ///
    /// Retryable failures sleep `retry_delay * 2^attempt` before the next try.
    /// The cancellation signal is checked before every attempt and interrupts
    /// sleeps; either way the result is `E::cancelled()`. Terminal failures and
    /// the last failure after the budget is spent are returned as-is.
    ///
    /// # Arguments
    /// * `cancel` - Cancellation signal observed between attempts
    /// * `operation` - Short label used in log lines
    /// * `action` - Zero-argument async operation
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancelSignal,
        operation: &str,
        mut action: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(operation, attempt = attempt + 1, "Cancelled before attempt");
                return Err(E::cancelled());
            }

            let error = match action().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation,
                            attempt = attempt + 1,
                            max_attempts,
                            "Succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= self.policy.max_retries {
                warn!(
                    operation,
                    attempts = attempt + 1,
                    error = %error,
                    "Retry budget exhausted"
                );
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                operation,
                attempt = attempt + 1,
                max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying after backoff"
            );
            record_retry_backoff(delay, attempt);

            if !cancel.sleep(delay).await {
                debug!(operation, "Cancelled during backoff sleep");
                return Err(E::cancelled());
            }
            attempt += 1;
        }
    }
}
