//! Full retrieval of a paginated listing.
//!
//! Page 0 is fetched directly and its descriptor drives the plan; the
//! remaining pages go through [`fetch_batch`] in sequential batches. Batch
//! failures are skipped; only cancellation aborts the run.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::cancel::SharedCancel;
use crate::downloader::batch::{fetch_batch, BatchRequest};
use crate::downloader::progress::ProgressState;
use crate::downloader::{DownloadError, DownloadResult};
use crate::fetcher::PageSource;
use crate::metrics::record_batch_skipped;
use crate::{Filters, PageInfo};

/// Upper bound on the accumulator capacity reserved from `totalElements`.
const MAX_PREALLOCATED_RECORDS: usize = 100_000;

/// Accumulated records of a retrieval plus loss accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval<T> {
    /// Every record fetched, page 0 first
    pub records: Vec<T>,
    /// Total pages reported by page 0
    pub total_pages: u32,
    /// Total elements reported by page 0
    pub total_elements: u64,
    /// Pages that failed inside otherwise successful batches
    pub failed_pages: u32,
    /// Batches skipped because none of their pages could be fetched
    pub skipped_batches: u32,
    /// Pages covered by skipped batches
    pub skipped_pages: u32,
}

impl<T> Retrieval<T> {
    fn empty(page: PageInfo) -> Self {
        Self {
            records: Vec::new(),
            total_pages: page.total_pages,
            total_elements: page.total_elements,
            failed_pages: 0,
            skipped_batches: 0,
            skipped_pages: 0,
        }
    }

    /// Whether the upstream reported no data at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pages whose records are missing from the result.
    pub fn unavailable_pages(&self) -> u32 {
        self.failed_pages.saturating_add(self.skipped_pages)
    }
}

/// Drives a complete retrieval over a [`PageSource`].
#[derive(Debug)]
pub struct RetrievalDriver<S> {
    source: Arc<S>,
}

impl<S> Clone for RetrievalDriver<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<S> RetrievalDriver<S> {
    /// Create a driver over a shared page source.
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Retrieve every page of `endpoint`.
    ///
    /// # Arguments
    /// * `cancel` - Run cancellation signal
    /// * `endpoint` - Listing endpoint path
    /// * `page_size` - Records per page
    /// * `max_pages_per_batch` - Upper bound on pages per batch
    /// * `concurrency_limit` - Pages in flight within a batch
    /// * `filters` - Query filters shared by every page
    ///
    /// # Errors
    /// `Cancelled` as soon as any layer observes cancellation; any error on
    /// page 0. Batch-level errors are absorbed and counted.
    pub async fn retrieve_all<T>(
        &self,
        cancel: &SharedCancel,
        endpoint: &str,
        page_size: u32,
        max_pages_per_batch: u32,
        concurrency_limit: usize,
        filters: Filters,
    ) -> DownloadResult<Retrieval<T>>
    where
        T: Send + 'static,
        S: PageSource<T> + 'static,
    {
        let started = Instant::now();
        info!(endpoint, page_size, "Fetching initial page (0) to get total pages");

        let first = self
            .source
            .fetch_page(cancel, endpoint, 0, page_size, &filters)
            .await?;
        let page = first.page;
        info!(
            total_pages = page.total_pages,
            total_elements = page.total_elements,
            "Initial page fetched"
        );

        if page.is_empty() {
            info!("Total pages or elements is zero, nothing to retrieve");
            return Ok(Retrieval::empty(page));
        }

        let capacity = usize::try_from(page.total_elements)
            .unwrap_or(MAX_PREALLOCATED_RECORDS)
            .min(MAX_PREALLOCATED_RECORDS);
        let mut retrieval = Retrieval::empty(page);
        retrieval.records.reserve(capacity);
        retrieval.records.extend(first.records);

        let mut progress = ProgressState::new(page.total_pages);
        progress.update(1, retrieval.records.len() as u64);

        let filters = Arc::new(filters);
        let batch_size = max_pages_per_batch.max(1);
        let mut next_page: u32 = 1;

        while next_page < page.total_pages {
            if cancel.is_cancelled() {
                info!(next_page, "Retrieval cancelled between batches");
                return Err(DownloadError::Cancelled);
            }

            let count = batch_size.min(page.total_pages - next_page);
            let request = BatchRequest::new(next_page, count, filters.clone());
            let before = retrieval.records.len();

            match fetch_batch(
                cancel,
                &self.source,
                endpoint,
                page_size,
                &request,
                concurrency_limit,
            )
            .await
            {
                Ok(outcome) => {
                    retrieval.failed_pages += outcome.failed_pages;
                    retrieval.records.extend(outcome.records);
                }
                Err(DownloadError::Cancelled) => {
                    info!(start_page = next_page, "Retrieval cancelled during batch");
                    return Err(DownloadError::Cancelled);
                }
                Err(e) => {
                    warn!(
                        start_page = next_page,
                        page_count = count,
                        error = %e,
                        "Failed to process batch, moving to next"
                    );
                    retrieval.skipped_batches += 1;
                    retrieval.skipped_pages += count;
                    record_batch_skipped(endpoint, count);
                }
            }

            next_page += count;
            progress.update(count, (retrieval.records.len() - before) as u64);
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }
        }

        info!(
            records = retrieval.records.len(),
            total_elements = retrieval.total_elements,
            failed_pages = retrieval.failed_pages,
            skipped_batches = retrieval.skipped_batches,
            duration_ms = started.elapsed().as_millis() as u64,
            "Retrieval finished"
        );

        Ok(retrieval)
    }
}
