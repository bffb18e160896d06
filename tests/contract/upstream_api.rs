//! Request shapes the upstream API expects

use enrollment_sync::config::RetryPolicy;
use enrollment_sync::fetcher::{ApiClient, FetcherError, PageFetcher, PageResult, PageSource, TokenCache};
use enrollment_sync::{CancelSignal, Enrollment, Filters};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{enrollment, envelope, mount_auth, AUTH_PATH, CREDENTIAL, ENROLLMENTS_PATH};

fn page_fetcher(server: &MockServer) -> PageFetcher {
    let client = Arc::new(
        ApiClient::new(server.uri(), RetryPolicy::new(1, Duration::from_millis(10))).unwrap(),
    );
    let tokens = Arc::new(TokenCache::new(
        client.clone(),
        AUTH_PATH,
        CREDENTIAL,
        Duration::from_secs(60),
    ));
    PageFetcher::new(client, tokens)
}

async fn fetch(
    fetcher: &PageFetcher,
    page_index: u32,
    filters: &Filters,
) -> Result<PageResult<Enrollment>, FetcherError> {
    PageSource::<Enrollment>::fetch_page(
        fetcher,
        &CancelSignal::new(),
        ENROLLMENTS_PATH,
        page_index,
        100,
        filters,
    )
    .await
}

#[tokio::test]
async fn test_page_request_carries_auth_and_query() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-abc", 1).await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .and(header("Authorization", "Bearer tok-abc"))
        .and(header("Content-Type", "application/json"))
        .and(query_param("currentPage", "3"))
        .and(query_param("pageSize", "100"))
        .and(query_param("idPeriodoLetivo", "77"))
        .and(query_param("statusMatricula", "ATIVA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
            3,
            100,
            302,
            vec![enrollment(301), enrollment(302)],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut filters = Filters::new();
    filters.insert("idPeriodoLetivo".into(), "77".into());
    filters.insert("statusMatricula".into(), "ATIVA".into());

    let page = fetch(&page_fetcher(&server), 3, &filters).await.unwrap();
    assert_eq!(page.page.current_page, 3);
    assert_eq!(page.page.total_pages, 4);
    assert_eq!(page.page.total_elements, 302);
    let ids: Vec<i64> = page.records.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![301, 302]);
    assert_eq!(page.records[0].organization.as_deref(), Some("EAD"));
}

#[tokio::test]
async fn test_token_exchange_sends_credential_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(header("token", CREDENTIAL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(0, 100, 0, vec![])))
        .mount(&server)
        .await;

    let fetcher = page_fetcher(&server);
    fetch(&fetcher, 0, &Filters::new()).await.unwrap();
    fetch(&fetcher, 0, &Filters::new()).await.unwrap();
    assert_eq!(fetcher.tokens().exchange_count(), 1);
}

#[tokio::test]
async fn test_envelope_without_page_is_decode_error() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok", 1).await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "elements": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetch(&page_fetcher(&server), 0, &Filters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::Decode(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok", 1).await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = fetch(&page_fetcher(&server), 0, &Filters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::Decode(_)));
}

#[tokio::test]
async fn test_auth_failure_prevents_page_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = fetch(&page_fetcher(&server), 0, &Filters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::Auth(_)));
}
