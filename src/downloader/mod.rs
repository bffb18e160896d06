//! Retrieval orchestration
//!
//! This module turns single-page fetches into complete retrievals.
//!
//! # Overview
//!
//! 1. **Batches**: [`batch::fetch_batch`] fetches a contiguous page range with
//!    a bounded worker pool
//! 2. **Retrieval**: [`retrieval::RetrievalDriver`] fetches page 0, then walks
//!    the remaining pages batch by batch
//! 3. **Sync jobs**: [`job::SyncExecutor`] resolves the output target, runs a
//!    retrieval and writes the result with a single overwrite
//! 4. **Progress**: [`progress::ProgressState`] emits periodic progress lines
//!
//! # Quick Start
//!
//! ```no_run
//! use enrollment_sync::config::SyncConfig;
//! use enrollment_sync::downloader::{SyncExecutor, SyncJob};
//! use enrollment_sync::output::CsvSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::new("https://api.example.com", "credential");
//! let sink = CsvSink::new("./output")?;
//! let executor = SyncExecutor::new(config, sink)?;
//!
//! let job = SyncJob::new(77).with_status("ATIVA").with_org(20);
//! let report = executor.execute(job).await?;
//! println!("{} rows written to {}", report.rows_written, report.target);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Failures are isolated at the smallest unit that can absorb them:
//! - a page that exhausts its retries is counted and skipped
//! - a batch whose pages all failed is skipped
//! - cancellation aborts the whole run and suppresses the sink write
//!
//! A failure to fetch page 0 fails the run, since the page count is unknown.

pub mod batch;
pub mod job;
pub mod progress;
pub mod retrieval;

pub use batch::{fetch_batch, BatchOutcome, BatchRequest};
pub use job::{SyncExecutor, SyncJob, SyncReport};
pub use progress::ProgressState;
pub use retrieval::{Retrieval, RetrievalDriver};

use crate::fetcher::FetcherError;
use crate::output::SinkError;

/// Retrieval and sync errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Deadline expired or the caller aborted
    #[error("operation cancelled")]
    Cancelled,

    /// Every page of a batch failed
    #[error("all {page_count} pages of batch starting at page {start_page} failed")]
    BatchFailed {
        /// First page index of the batch
        start_page: u32,
        /// Number of pages in the batch
        page_count: u32,
    },

    /// Fetch error that is not recoverable at this level
    #[error("fetch error: {0}")]
    Fetch(FetcherError),

    /// Sink error
    #[error("output error: {0}")]
    Sink(SinkError),

    /// Invalid configuration or job parameters
    #[error("validation error: {0}")]
    Validation(String),
}

impl DownloadError {
    /// Whether this error stems from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl From<FetcherError> for DownloadError {
    fn from(error: FetcherError) -> Self {
        match error {
            FetcherError::Cancelled => DownloadError::Cancelled,
            other => DownloadError::Fetch(other),
        }
    }
}

impl From<SinkError> for DownloadError {
    fn from(error: SinkError) -> Self {
        match error {
            SinkError::Cancelled => DownloadError::Cancelled,
            other => DownloadError::Sink(other),
        }
    }
}

/// Result type for retrieval operations
pub type DownloadResult<T> = Result<T, DownloadError>;
