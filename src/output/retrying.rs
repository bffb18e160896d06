//! Retry wrapper for sinks.
//!
//! Every operation of the inner sink runs through the shared [`Backoff`]
//! executor, so transient sink failures get the same bounded exponential
//! retry as HTTP requests.

use async_trait::async_trait;

use super::{Row, Sink, SinkResult};
use crate::cancel::CancelSignal;
use crate::fetcher::Backoff;

/// Sink decorator that retries transient failures.
#[derive(Debug, Clone)]
pub struct RetryingSink<S> {
    inner: S,
    backoff: Backoff,
}

impl<S: Sink> RetryingSink<S> {
    /// Wrap `inner`, retrying with `backoff`.
    pub fn new(inner: S, backoff: Backoff) -> Self {
        Self { inner, backoff }
    }

    /// Wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Sink> Sink for RetryingSink<S> {
    async fn ensure_target_exists(&self, cancel: &CancelSignal, name: &str) -> SinkResult<()> {
        self.backoff
            .execute(cancel, "ensure target", || {
                self.inner.ensure_target_exists(cancel, name)
            })
            .await
    }

    async fn clear(&self, cancel: &CancelSignal, name: &str) -> SinkResult<()> {
        self.backoff
            .execute(cancel, "clear target", || self.inner.clear(cancel, name))
            .await
    }

    async fn set_headers(
        &self,
        cancel: &CancelSignal,
        name: &str,
        headers: &[String],
    ) -> SinkResult<()> {
        self.backoff
            .execute(cancel, "set headers", || {
                self.inner.set_headers(cancel, name, headers)
            })
            .await
    }

    async fn append_rows(&self, cancel: &CancelSignal, name: &str, rows: &[Row]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.backoff
            .execute(cancel, "append rows", || {
                self.inner.append_rows(cancel, name, rows)
            })
            .await
    }

    async fn overwrite_all(
        &self,
        cancel: &CancelSignal,
        name: &str,
        headers: &[String],
        rows: &[Row],
    ) -> SinkResult<()> {
        self.backoff
            .execute(cancel, "overwrite target", || {
                self.inner.overwrite_all(cancel, name, headers, rows)
            })
            .await
    }
}
