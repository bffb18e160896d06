//! Bearer token cache for the upstream API.
//!
//! The cached token lives behind one async mutex. The lock is held across a
//! refresh, so concurrent callers queue behind the exchange and then observe
//! the fresh token: at most one exchange is ever in flight. Every call takes
//! the lock, including cache hits.

use reqwest::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::fetcher::http::ApiClient;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::AuthResponse;

/// Header carrying the static credential on the token exchange.
const CREDENTIAL_HEADER: &str = "token";

/// Bearer token with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: Instant,
}

impl Token {
    /// Bearer string.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Instant after which the token is no longer used.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the validity window has elapsed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Token cache for the upstream API.
#[derive(Debug)]
pub struct TokenCache {
    client: Arc<ApiClient>,
    auth_endpoint: String,
    credential: String,
    validity: Duration,
    cached: Mutex<Option<Token>>,
    exchanges: AtomicU64,
}

impl TokenCache {
    /// Create a token cache.
    ///
    /// # Arguments
    /// * `client` - Shared API client used for the exchange
    /// * `auth_endpoint` - Token exchange path (e.g., "/auth/token")
    /// * `credential` - Static credential sent in the `token` header
    /// * `validity` - Fixed lifetime applied to every fresh token
    pub fn new(
        client: Arc<ApiClient>,
        auth_endpoint: impl Into<String>,
        credential: impl Into<String>,
        validity: Duration,
    ) -> Self {
        Self {
            client,
            auth_endpoint: auth_endpoint.into(),
            credential: credential.into(),
            validity,
            cached: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Get a valid token, authenticating only when absent or expired.
    ///
    /// # Errors
    /// `Cancelled` when the signal interrupts the exchange (or fires while
    /// waiting for another caller's refresh); `Auth` for every other failure.
    #[instrument(skip_all)]
    pub async fn get_token(&self, cancel: &CancelSignal) -> FetcherResult<Token> {
        let mut cached = tokio::select! {
            guard = self.cached.lock() => guard,
            _ = cancel.cancelled() => return Err(FetcherError::Cancelled),
        };

        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                debug!("Using cached token");
                return Ok(token.clone());
            }
        }

        info!("Token expired or not available, authenticating");
        let token = self.exchange(cancel).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Number of token exchanges attempted so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Perform one exchange through the retrying client.
    async fn exchange(&self, cancel: &CancelSignal) -> FetcherResult<Token> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let headers = [(CREDENTIAL_HEADER, self.credential.clone())];
        let body = self
            .client
            .request(cancel, Method::POST, &self.auth_endpoint, &headers, &[])
            .await
            .map_err(|e| match e {
                FetcherError::Cancelled => FetcherError::Cancelled,
                other => {
                    warn!(error = %other, "Token exchange failed");
                    FetcherError::Auth(format!("failed to obtain token: {other}"))
                }
            })?;

        let response: AuthResponse = serde_json::from_str(&body)
            .map_err(|e| FetcherError::Auth(format!("failed to parse token response: {e}")))?;

        if response.token.is_empty() {
            return Err(FetcherError::Auth("token response was empty".to_string()));
        }

        let expires_at = Instant::now() + self.validity;
        info!(
            validity_secs = self.validity.as_secs(),
            "New token obtained"
        );

        Ok(Token {
            value: response.token,
            expires_at,
        })
    }
}
