//! Upstream API access
//!
//! Layers, leaves first:
//!
//! - [`backoff`] - bounded retry with exponential delay, cancellation aware
//! - [`http`] - one HTTP attempt with status classification
//! - [`auth`] - bearer token cache with serialized refresh
//! - [`page`] - authenticated paginated requests decoded into [`PageResult`]
//! - [`periods`] - academic period label lookup

use crate::cancel::CancelSignal;
use crate::{Filters, PageInfo};
use async_trait::async_trait;

pub mod auth;
pub mod backoff;
pub mod http;
pub mod page;
pub mod periods;

pub use auth::TokenCache;
pub use backoff::{Backoff, Classify};
pub use http::ApiClient;
pub use page::PageFetcher;

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// Deadline expired or the caller aborted
    #[error("operation cancelled")]
    Cancelled,

    /// Network failure, 429 or 5xx; retried until the budget runs out
    #[error("transient error: {0}")]
    Transient(String),

    /// Token exchange failed or produced no usable token
    #[error("authentication error: {0}")]
    Auth(String),

    /// Client error other than 429; never retried
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body, trimmed
        body: String,
    },

    /// Response did not match the expected envelope
    #[error("decode error: {0}")]
    Decode(String),

    /// Request could not be built (bad URL, invalid header value)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetcherError {
    /// Whether this error stems from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetcherError::Cancelled)
    }
}

impl Classify for FetcherError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetcherError::Transient(_))
    }

    fn cancelled() -> Self {
        FetcherError::Cancelled
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Records of one page plus the descriptor that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    /// Records in upstream order
    pub records: Vec<T>,
    /// Pagination metadata reported with this page
    pub page: PageInfo,
}

/// Source of paginated records.
///
/// [`PageFetcher`] is the network implementation; the orchestrator and the
/// retrieval driver depend only on this trait.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetch one page.
    ///
    /// # Arguments
    /// * `cancel` - Run cancellation signal
    /// * `endpoint` - Listing endpoint path (e.g. "/academico/matriculas")
    /// * `page_index` - Zero-based page index
    /// * `page_size` - Records per page
    /// * `filters` - Additional query parameters
    async fn fetch_page(
        &self,
        cancel: &CancelSignal,
        endpoint: &str,
        page_index: u32,
        page_size: u32,
        filters: &Filters,
    ) -> FetcherResult<PageResult<T>>;
}
