//! HTTP client for the upstream API
//!
//! Provides one shared client for all API interactions with:
//! - Status classification (success / retryable / terminal)
//! - Retry through the [`Backoff`] executor
//! - Per-request metrics and structured logging

use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::config::{RetryPolicy, HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS};
use crate::fetcher::backoff::Backoff;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics::HttpRequestMetrics;

/// Unified HTTP client for all upstream API interactions
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    backoff: Backoff,
}

impl ApiClient {
    /// Create a client with its own connection pool and default timeouts.
    ///
    /// # Arguments
    /// * `base_url` - Base URL for API endpoints (e.g., "<https://api.example.com>")
    /// * `retry` - Retry policy applied to every request
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetcherError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, retry))
    }

    /// Create a client around an existing [`reqwest::Client`].
    pub fn with_client(client: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            backoff: Backoff::new(retry),
        }
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request with retry and return the response body.
    ///
    /// # Arguments
    /// * `cancel` - Cancellation signal observed between attempts
    /// * `method` - HTTP method
    /// * `endpoint` - API endpoint path (e.g., "/academico/matriculas")
    /// * `headers` - Extra request headers
    /// * `query` - Query parameters as key-value pairs
    ///
    /// # Errors
    /// `Transient` after the retry budget is spent, `Http` for terminal client
    /// errors (body included), `Cancelled` when the signal fires.
    pub async fn request(
        &self,
        cancel: &CancelSignal,
        method: Method,
        endpoint: &str,
        headers: &[(&str, String)],
        query: &[(String, String)],
    ) -> FetcherResult<String> {
        let url = format!("{}{}", self.base_url, endpoint);
        let operation = format!("{method} {endpoint}");
        let mut attempt: u32 = 0;

        self.backoff
            .execute(cancel, &operation, || {
                let current = attempt;
                attempt += 1;
                self.send_once(cancel, method.clone(), &url, endpoint, headers, query, current)
            })
            .await
    }

    /// Perform a single attempt and classify the outcome.
    ///
    /// Sending and body download both yield to the cancellation signal.
    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        cancel: &CancelSignal,
        method: Method,
        url: &str,
        endpoint: &str,
        headers: &[(&str, String)],
        query: &[(String, String)],
        attempt: u32,
    ) -> FetcherResult<String> {
        let metrics = HttpRequestMetrics::start(endpoint, attempt);

        let mut request = self.client.request(method, url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        debug!(url, attempt = attempt + 1, params = query.len(), "Sending request");

        let sent = tokio::select! {
            sent = request.send() => sent,
            _ = cancel.cancelled() => {
                debug!(url, attempt = attempt + 1, "Request abandoned on cancellation");
                return Err(FetcherError::Cancelled);
            }
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return Err(FetcherError::InvalidRequest(e.to_string()));
            }
            Err(e) => {
                metrics.record_network_error();
                return Err(FetcherError::Transient(format!("network error: {e}")));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        let body = tokio::select! {
            body = response.text() => body
                .map_err(|e| FetcherError::Transient(format!("failed to read response body: {e}"))),
            _ = cancel.cancelled() => return Err(FetcherError::Cancelled),
        };

        classify_response(status, body)
    }
}

/// Map a status code and body into success, retryable or terminal outcomes.
///
/// 2xx → body; 429 and 5xx → `Transient`; any other status → `Http`.
pub fn classify_response(
    status: StatusCode,
    body: FetcherResult<String>,
) -> FetcherResult<String> {
    if status.is_success() {
        return body;
    }

    let detail = match body {
        Ok(text) => text.trim().to_string(),
        Err(e) => format!("<unreadable body: {e}>"),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(FetcherError::Transient(format!(
            "HTTP {}: {}",
            status.as_u16(),
            detail
        )));
    }

    Err(FetcherError::Http {
        status: status.as_u16(),
        body: detail,
    })
}
