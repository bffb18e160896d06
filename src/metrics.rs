//! Observability metrics for enrollment synchronization
//!
//! Counters and histograms cover the HTTP layer (requests, retries, backoff
//! sleeps), page and batch losses during retrieval, and whole sync runs.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for an optional scrape endpoint (`--metrics-addr`)
//! - Recording is a no-op until an exporter is installed

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Set once the Prometheus exporter is installed
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call logs and returns without reinstalling.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}").into());
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the upstream API"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "pages_failed_total",
        Unit::Count,
        "Pages that still failed after exhausting retries"
    );
    describe_counter!(
        "batches_skipped_total",
        Unit::Count,
        "Batches in which every page failed"
    );
    describe_counter!(
        "sync_runs_total",
        Unit::Count,
        "Sync runs by outcome"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP attempt
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP attempt
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request metrics"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a page abandoned after exhausting its retries
pub fn record_page_failed(endpoint: &str) {
    counter!("pages_failed_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a batch skipped because none of its pages could be fetched
pub fn record_batch_skipped(endpoint: &str, page_count: u32) {
    counter!("batches_skipped_total", "endpoint" => endpoint.to_string()).increment(1);
    debug!(endpoint, page_count, "Batch skip recorded");
}

/// Sync run metrics
pub struct RunMetrics {
    target: String,
    start_time: Instant,
}

impl RunMetrics {
    /// Start tracking a sync run
    pub fn start(target: impl Into<String>) -> Self {
        let target = target.into();
        info!(target = %target, "Sync run started");
        Self {
            target,
            start_time: Instant::now(),
        }
    }

    /// Record successful completion
    pub fn record_success(&self, rows_written: u64) {
        let duration = self.start_time.elapsed();

        counter!("sync_runs_total", "outcome" => "success").increment(1);

        info!(
            target = %self.target,
            rows_written = rows_written,
            duration_secs = duration.as_secs(),
            "Sync run completed successfully"
        );
    }

    /// Record failed run
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!("sync_runs_total", "outcome" => "failure").increment(1);

        error!(
            target = %self.target,
            error = %error,
            duration_secs = duration.as_secs(),
            "Sync run failed"
        );
    }

    /// Record a run stopped by cancellation
    pub fn record_cancelled(&self) {
        counter!("sync_runs_total", "outcome" => "cancelled").increment(1);
        warn!(
            target = %self.target,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Sync run cancelled"
        );
    }
}
