//! Enrollment sync jobs.
//!
//! A [`SyncJob`] names one slice of the enrollment collection (academic
//! period, optional status and organization). [`SyncExecutor`] resolves the
//! output target, retrieves every matching enrollment and replaces the
//! target content with a single [`Sink::overwrite_all`] call.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};

use crate::cancel::{CancelSignal, SharedCancel};
use crate::config::SyncConfig;
use crate::downloader::retrieval::RetrievalDriver;
use crate::downloader::{DownloadError, DownloadResult};
use crate::fetcher::periods::PeriodLookup;
use crate::fetcher::{ApiClient, Backoff, PageFetcher, PageSource, TokenCache};
use crate::metrics::RunMetrics;
use crate::output::{enrollment_headers, enrollment_row, RetryingSink, Row, Sink};
use crate::registry::{target_name, OrganizationRegistry};
use crate::{Enrollment, Filters, Period};

/// One enrollment slice to synchronize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    /// Academic period id (`idPeriodoLetivo`)
    pub period_id: i64,
    /// Enrollment status filter (`statusMatricula`)
    pub status: Option<String>,
    /// Organization id (`idOrg`), used for filtering and naming
    pub org_id: Option<i64>,
    /// Explicit target name overriding the derived one
    pub target: Option<String>,
}

impl SyncJob {
    /// Job for every enrollment of `period_id`.
    pub fn new(period_id: i64) -> Self {
        Self {
            period_id,
            status: None,
            org_id: None,
            target: None,
        }
    }

    /// Restrict to one enrollment status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Restrict to one organization.
    pub fn with_org(mut self, org_id: i64) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Write to `target` instead of the derived name.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Validate job parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.period_id <= 0 {
            return Err(format!("period id must be positive, got {}", self.period_id));
        }
        if matches!(&self.status, Some(s) if s.trim().is_empty()) {
            return Err("status must not be blank".to_string());
        }
        if matches!(&self.target, Some(t) if t.trim().is_empty()) {
            return Err("target must not be blank".to_string());
        }
        Ok(())
    }

    /// Query filters for the enrollment listing.
    pub fn filters(&self) -> Filters {
        let mut filters = Filters::new();
        filters.insert("idPeriodoLetivo".to_string(), self.period_id.to_string());
        if let Some(status) = &self.status {
            filters.insert("statusMatricula".to_string(), status.clone());
        }
        if let Some(org) = self.org_id {
            filters.insert("idOrg".to_string(), org.to_string());
        }
        filters
    }
}

/// Summary of a completed sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Target that was overwritten
    pub target: String,
    /// Data rows written (header excluded)
    pub rows_written: u64,
    /// Total pages reported upstream
    pub total_pages: u32,
    /// Total elements reported upstream
    pub total_elements: u64,
    /// Pages that failed inside partially successful batches
    pub failed_pages: u32,
    /// Batches skipped entirely
    pub skipped_batches: u32,
    /// Pages whose records are missing from the output
    pub unavailable_pages: u32,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl SyncReport {
    /// Whether every upstream page made it into the output.
    pub fn is_complete(&self) -> bool {
        self.unavailable_pages == 0
    }
}

/// Runs sync jobs against a page source and a sink.
pub struct SyncExecutor<K, S = PageFetcher> {
    config: SyncConfig,
    source: Arc<S>,
    sink: K,
    registry: OrganizationRegistry,
}

impl<K: Sink> SyncExecutor<RetryingSink<K>, PageFetcher> {
    /// Create an executor talking to the configured API.
    ///
    /// Sink operations are retried with the same policy as HTTP requests.
    pub fn new(config: SyncConfig, sink: K) -> DownloadResult<Self> {
        config.validate().map_err(DownloadError::Validation)?;

        let client = Arc::new(ApiClient::new(config.api_base.clone(), config.retry)?);
        let tokens = Arc::new(TokenCache::new(
            client.clone(),
            config.endpoints.auth.clone(),
            config.user_token.clone(),
            config.token_validity,
        ));
        let source = Arc::new(PageFetcher::new(client, tokens));
        let sink = RetryingSink::new(sink, Backoff::new(config.retry));

        Ok(Self::with_source(config, source, sink))
    }
}

impl<K, S> SyncExecutor<K, S>
where
    K: Sink,
    S: PageSource<Enrollment> + PageSource<Period> + 'static,
{
    /// Create an executor over an arbitrary page source.
    pub fn with_source(config: SyncConfig, source: Arc<S>, sink: K) -> Self {
        Self {
            config,
            source,
            sink,
            registry: OrganizationRegistry::builtin(),
        }
    }

    /// Replace the organization registry used for naming.
    pub fn with_registry(mut self, registry: OrganizationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sink receiving the output.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run `job` under the configured run deadline.
    pub async fn execute(&self, job: SyncJob) -> DownloadResult<SyncReport> {
        let cancel = CancelSignal::with_deadline(self.config.run_deadline);
        self.execute_with_cancel(job, cancel).await
    }

    /// Run `job` observing an externally controlled cancellation signal.
    ///
    /// # Errors
    /// `Cancelled` if the signal fires before the sink write is issued; no
    /// write happens in that case. Page 0, target resolution and sink errors
    /// are returned as-is.
    pub async fn execute_with_cancel(
        &self,
        job: SyncJob,
        cancel: SharedCancel,
    ) -> DownloadResult<SyncReport> {
        let span = info_span!(
            "sync",
            period_id = job.period_id,
            status = job.status.as_deref().unwrap_or("*"),
            org_id = job.org_id.unwrap_or(-1)
        );
        self.run(job, cancel).instrument(span).await
    }

    async fn run(&self, job: SyncJob, cancel: SharedCancel) -> DownloadResult<SyncReport> {
        let started = Instant::now();
        job.validate().map_err(DownloadError::Validation)?;

        let target = self.resolve_target(&cancel, &job).await?;
        let metrics = RunMetrics::start(&target);

        let result = self.sync_into(&cancel, &job, target, started).await;
        match &result {
            Ok(report) => metrics.record_success(report.rows_written),
            Err(e) if e.is_cancelled() => metrics.record_cancelled(),
            Err(e) => metrics.record_failure(&e.to_string()),
        }
        result
    }

    /// Explicit target, or `Matrículas <org> STATUS: <status> | <period>`.
    async fn resolve_target(&self, cancel: &SharedCancel, job: &SyncJob) -> DownloadResult<String> {
        if let Some(target) = &job.target {
            return Ok(target.clone());
        }

        let organization = self.registry.display_name(job.org_id);
        let lookup = PeriodLookup::new(
            &*self.source,
            &self.config.endpoints.notices,
            self.config.page_size,
            &self.config.notice_statuses,
        );
        let label = lookup.label_for(cancel, job.org_id, job.period_id).await?;

        let name = target_name(
            organization,
            job.status.as_deref(),
            job.period_id,
            label.as_deref(),
        );
        info!(target = %name, "Target name determined");
        Ok(name)
    }

    async fn sync_into(
        &self,
        cancel: &SharedCancel,
        job: &SyncJob,
        target: String,
        started: Instant,
    ) -> DownloadResult<SyncReport> {
        let driver = RetrievalDriver::new(self.source.clone());
        let retrieval = driver
            .retrieve_all::<Enrollment>(
                cancel,
                &self.config.endpoints.enrollments,
                self.config.page_size,
                self.config.max_pages_per_batch,
                self.config.max_parallel_requests,
                job.filters(),
            )
            .await?;

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        if retrieval.unavailable_pages() > 0 {
            warn!(
                unavailable_pages = retrieval.unavailable_pages(),
                total_pages = retrieval.total_pages,
                "Some pages could not be fetched; output is incomplete"
            );
        }

        let rows: Vec<Row> = retrieval.records.iter().map(enrollment_row).collect();
        info!(rows = rows.len(), target = %target, "Writing enrollments");
        self.sink
            .overwrite_all(cancel, &target, &enrollment_headers(), &rows)
            .await?;

        Ok(SyncReport {
            target,
            rows_written: rows.len() as u64,
            total_pages: retrieval.total_pages,
            total_elements: retrieval.total_elements,
            failed_pages: retrieval.failed_pages,
            skipped_batches: retrieval.skipped_batches,
            unavailable_pages: retrieval.unavailable_pages(),
            duration: started.elapsed(),
        })
    }
}
