//! Bounded-concurrency batch fetch.
//!
//! A batch is a contiguous page range. Workers share an atomic cursor as the
//! work queue and one lock-protected result state; the orchestrator reads
//! that state only after every worker has been joined.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cancel::SharedCancel;
use crate::downloader::{DownloadError, DownloadResult};
use crate::fetcher::PageSource;
use crate::metrics::record_page_failed;
use crate::Filters;

/// Unit of work handed to [`fetch_batch`]. Immutable once issued.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// First page index
    pub start_page: u32,
    /// Number of pages
    pub page_count: u32,
    /// Filters shared by every page of the run
    pub filters: Arc<Filters>,
}

impl BatchRequest {
    /// Create a batch request.
    pub fn new(start_page: u32, page_count: u32, filters: Arc<Filters>) -> Self {
        Self {
            start_page,
            page_count,
            filters,
        }
    }

    /// Page indices covered, `[start_page, start_page + page_count)`.
    pub fn pages(&self) -> Range<u32> {
        self.start_page..self.start_page.saturating_add(self.page_count)
    }
}

/// Records of a batch plus the number of pages that could not be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    /// Merged records; page order is unspecified, order within a page is kept
    pub records: Vec<T>,
    /// Pages that failed after exhausting retries
    pub failed_pages: u32,
}

impl<T> BatchOutcome<T> {
    /// Whether every page was fetched.
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0
    }
}

/// Result state shared by the workers of one batch.
struct BatchState<T> {
    records: Vec<T>,
    failed_pages: u32,
}

/// Everything a worker needs, cloned per worker.
struct Worker<S> {
    id: usize,
    cancel: SharedCancel,
    source: Arc<S>,
    endpoint: Arc<str>,
    page_size: u32,
    filters: Arc<Filters>,
    cursor: Arc<AtomicU32>,
    end: u32,
}

impl<S> Worker<S> {
    async fn run<T>(self, state: Arc<Mutex<BatchState<T>>>)
    where
        S: PageSource<T>,
    {
        loop {
            if self.cancel.is_cancelled() {
                debug!(worker = self.id, "Cancellation observed, worker stopping");
                return;
            }

            let page = self.cursor.fetch_add(1, Ordering::SeqCst);
            if page >= self.end {
                return;
            }

            let result = self
                .source
                .fetch_page(
                    &self.cancel,
                    &self.endpoint,
                    page,
                    self.page_size,
                    &self.filters,
                )
                .await;

            match result {
                Ok(fetched) => {
                    if self.cancel.is_cancelled() {
                        debug!(worker = self.id, page, "Cancelled before hand-off, discarding page");
                        return;
                    }
                    let count = fetched.records.len();
                    lock(&state).records.extend(fetched.records);
                    debug!(worker = self.id, page, records = count, "Page merged");
                }
                Err(e) if e.is_cancelled() || self.cancel.is_cancelled() => {
                    debug!(worker = self.id, page, "Page fetch cancelled, worker stopping");
                    return;
                }
                Err(e) => {
                    warn!(worker = self.id, page, error = %e, "Failed to fetch page after retries");
                    lock(&state).failed_pages += 1;
                    record_page_failed(&self.endpoint);
                }
            }
        }
    }
}

fn lock<T>(state: &Mutex<BatchState<T>>) -> MutexGuard<'_, BatchState<T>> {
    // A worker that panicked while holding the lock left the state consistent:
    // every mutation is a single extend or increment.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fetch every page of `request` with at most `concurrency_limit` pages in flight.
///
/// # Errors
/// `Cancelled` when the signal is set once all workers have stopped, whatever
/// partial progress was made. `BatchFailed` when every page failed. Partial
/// failure is reported through [`BatchOutcome::failed_pages`].
pub async fn fetch_batch<T, S>(
    cancel: &SharedCancel,
    source: &Arc<S>,
    endpoint: &str,
    page_size: u32,
    request: &BatchRequest,
    concurrency_limit: usize,
) -> DownloadResult<BatchOutcome<T>>
where
    T: Send + 'static,
    S: PageSource<T> + 'static,
{
    let pages = request.pages();
    let page_count = pages.end - pages.start;
    if page_count == 0 {
        return Ok(BatchOutcome {
            records: Vec::new(),
            failed_pages: 0,
        });
    }

    let worker_count = concurrency_limit.clamp(1, page_count as usize);
    info!(
        start_page = pages.start,
        end_page = pages.end - 1,
        workers = worker_count,
        "Starting batch fetch"
    );

    let state = Arc::new(Mutex::new(BatchState {
        records: Vec::new(),
        failed_pages: 0,
    }));
    let cursor = Arc::new(AtomicU32::new(pages.start));
    let endpoint: Arc<str> = Arc::from(endpoint);

    let mut workers = JoinSet::new();
    for id in 0..worker_count {
        let worker = Worker {
            id,
            cancel: cancel.clone(),
            source: source.clone(),
            endpoint: endpoint.clone(),
            page_size,
            filters: request.filters.clone(),
            cursor: cursor.clone(),
            end: pages.end,
        };
        workers.spawn(worker.run(state.clone()));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            // A worker dies holding exactly one claimed page.
            error!(error = %e, "Batch worker panicked, counting its page as failed");
            lock(&state).failed_pages += 1;
            record_page_failed(&endpoint);
        }
    }

    if cancel.is_cancelled() {
        info!(start_page = pages.start, "Batch cancelled");
        return Err(DownloadError::Cancelled);
    }

    let (records, failed_pages) = {
        let mut guard = lock(&state);
        (std::mem::take(&mut guard.records), guard.failed_pages)
    };

    if failed_pages >= page_count {
        warn!(
            start_page = pages.start,
            page_count, "Every page of the batch failed"
        );
        return Err(DownloadError::BatchFailed {
            start_page: pages.start,
            page_count,
        });
    }

    if failed_pages > 0 {
        warn!(
            start_page = pages.start,
            failed_pages,
            page_count,
            records = records.len(),
            "Batch completed with failed pages"
        );
    } else {
        info!(
            start_page = pages.start,
            records = records.len(),
            "Batch completed"
        );
    }

    Ok(BatchOutcome {
        records,
        failed_pages,
    })
}
