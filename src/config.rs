//! Sync configuration defaults and the assembled [`SyncConfig`].

use std::path::PathBuf;
use std::time::Duration;

/// Records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Pages fetched concurrently as one batch.
/// 50 pages of 500 keeps a batch around 25k records in memory at once.
pub const DEFAULT_MAX_PAGES_PER_BATCH: u32 = 50;

/// Maximum page requests in flight within a batch.
pub const DEFAULT_MAX_PARALLEL_REQUESTS: usize = 10;

/// Retries after the first attempt (4 attempts total).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
/// Retry N waits `2000ms * 2^N`, so three retries wait 2s, 4s and 8s.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Fixed validity window applied to every freshly obtained token.
pub const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 15 * 60;

/// Wall-clock budget for one complete run.
pub const DEFAULT_RUN_DEADLINE_SECS: u64 = 10 * 60;

/// HTTP connect timeout (seconds).
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout (seconds) for a single attempt.
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Authentication endpoint path.
pub const AUTH_ENDPOINT: &str = "/auth/token";

/// Enrollment listing endpoint path.
pub const ENROLLMENTS_ENDPOINT: &str = "/academico/matriculas";

/// Process notice (academic period) listing endpoint path.
pub const NOTICES_ENDPOINT: &str = "/academico/editais";

/// Notice statuses searched, in order, when resolving a period label.
pub const DEFAULT_NOTICE_STATUSES: &[&str] = &["ABERTO", "ENCERRADO"];

/// Upstream API endpoint paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Token exchange endpoint.
    pub auth: String,
    /// Paginated enrollment listing.
    pub enrollments: String,
    /// Paginated process notice listing, used to resolve period labels.
    pub notices: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: AUTH_ENDPOINT.to_string(),
            enrollments: ENROLLMENTS_ENDPOINT.to_string(),
            notices: NOTICES_ENDPOINT.to_string(),
        }
    }
}

/// Backoff parameters shared by the HTTP client and the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` sleeps `retry_delay * 2^n`.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Delay applied after failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

/// Everything the core needs for one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upstream base URL, without trailing slash.
    pub api_base: String,
    /// Static credential sent to the auth endpoint.
    pub user_token: String,
    /// Endpoint paths.
    pub endpoints: Endpoints,
    /// Records per page.
    pub page_size: u32,
    /// Pages per batch.
    pub max_pages_per_batch: u32,
    /// Page requests in flight per batch.
    pub max_parallel_requests: usize,
    /// Retry behaviour for HTTP and sink calls.
    pub retry: RetryPolicy,
    /// Validity window applied to fresh tokens.
    pub token_validity: Duration,
    /// Deadline for one complete run.
    pub run_deadline: Duration,
    /// Notice statuses searched when resolving period labels.
    pub notice_statuses: Vec<String>,
    /// Directory receiving CSV targets.
    pub output_dir: PathBuf,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but the
    /// upstream location and credential.
    pub fn new(api_base: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            user_token: user_token.into(),
            endpoints: Endpoints::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages_per_batch: DEFAULT_MAX_PAGES_PER_BATCH,
            max_parallel_requests: DEFAULT_MAX_PARALLEL_REQUESTS,
            retry: RetryPolicy::default(),
            token_validity: Duration::from_secs(DEFAULT_TOKEN_VALIDITY_SECS),
            run_deadline: Duration::from_secs(DEFAULT_RUN_DEADLINE_SECS),
            notice_statuses: DEFAULT_NOTICE_STATUSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir: PathBuf::from("output"),
        }
    }

    /// Check value ranges the core relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_base.is_empty() {
            return Err("API base URL must not be empty".to_string());
        }
        if self.user_token.is_empty() {
            return Err("user token must not be empty".to_string());
        }
        if self.page_size == 0 {
            return Err("page size must be at least 1".to_string());
        }
        if self.max_pages_per_batch == 0 {
            return Err("max pages per batch must be at least 1".to_string());
        }
        if self.max_parallel_requests == 0 {
            return Err("max parallel requests must be at least 1".to_string());
        }
        Ok(())
    }
}
