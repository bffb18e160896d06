//! Authenticated paginated requests.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::fetcher::auth::TokenCache;
use crate::fetcher::http::ApiClient;
use crate::fetcher::{FetcherError, FetcherResult, PageResult, PageSource};
use crate::{ApiResponse, Filters};

/// Fetches single pages of any listing endpoint.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Arc<ApiClient>,
    tokens: Arc<TokenCache>,
}

impl PageFetcher {
    /// Create a page fetcher sharing a client and a token cache.
    pub fn new(client: Arc<ApiClient>, tokens: Arc<TokenCache>) -> Self {
        Self { client, tokens }
    }

    /// Token cache used for authentication.
    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Build `{currentPage, pageSize, ...filters}`.
    ///
    /// Filters cannot override the pagination parameters.
    pub fn build_query(page_index: u32, page_size: u32, filters: &Filters) -> Vec<(String, String)> {
        let mut query = vec![
            ("currentPage".to_string(), page_index.to_string()),
            ("pageSize".to_string(), page_size.to_string()),
        ];
        query.extend(
            filters
                .iter()
                .filter(|(key, _)| key.as_str() != "currentPage" && key.as_str() != "pageSize")
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        query
    }

    /// Decode an envelope body into a [`PageResult`].
    pub fn decode<T: DeserializeOwned>(body: &str) -> FetcherResult<PageResult<T>> {
        let response: ApiResponse<T> = serde_json::from_str(body)
            .map_err(|e| FetcherError::Decode(format!("failed to decode page envelope: {e}")))?;

        let page = response.page.ok_or_else(|| {
            FetcherError::Decode("response did not contain pagination info".to_string())
        })?;

        Ok(PageResult {
            records: response.elements,
            page,
        })
    }
}

#[async_trait]
impl<T> PageSource<T> for PageFetcher
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(
        &self,
        cancel: &CancelSignal,
        endpoint: &str,
        page_index: u32,
        page_size: u32,
        filters: &Filters,
    ) -> FetcherResult<PageResult<T>> {
        let token = self.tokens.get_token(cancel).await?;

        let headers = [
            ("Authorization", format!("Bearer {}", token.value())),
            ("Content-Type", "application/json".to_string()),
        ];
        let query = Self::build_query(page_index, page_size, filters);

        debug!(endpoint, page = page_index, page_size, "Fetching page");
        let body = self
            .client
            .request(cancel, Method::GET, endpoint, &headers, &query)
            .await?;

        let result = Self::decode::<T>(&body)?;
        debug!(
            endpoint,
            page = page_index,
            records = result.records.len(),
            total_pages = result.page.total_pages,
            "Page decoded"
        );
        Ok(result)
    }
}
