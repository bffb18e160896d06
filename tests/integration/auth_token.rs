//! Token cache behaviour against a mock auth endpoint

use enrollment_sync::config::RetryPolicy;
use enrollment_sync::fetcher::{ApiClient, FetcherError, TokenCache};
use enrollment_sync::CancelSignal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{mount_auth, AUTH_PATH, CREDENTIAL};

fn token_cache(server: &MockServer, validity: Duration) -> Arc<TokenCache> {
    let client = Arc::new(
        ApiClient::new(server.uri(), RetryPolicy::new(2, Duration::from_millis(10))).unwrap(),
    );
    Arc::new(TokenCache::new(client, AUTH_PATH, CREDENTIAL, validity))
}

#[tokio::test]
async fn test_token_reused_within_validity() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    let cache = token_cache(&server, Duration::from_secs(60));
    let cancel = CancelSignal::new();

    let first = cache.get_token(&cancel).await.unwrap();
    let second = cache.get_token(&cancel).await.unwrap();

    assert_eq!(first.value(), "tok-1");
    assert_eq!(first, second);
    assert_eq!(cache.exchange_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": "tok-shared" }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = token_cache(&server, Duration::from_secs(60));
    let cancel = CancelSignal::shared();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { cache.get_token(&cancel).await }));
    }

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.value(), "tok-shared");
    }
    assert_eq!(cache.exchange_count(), 1);
}

#[tokio::test]
async fn test_token_refreshed_after_validity_window() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 2).await;

    let cache = token_cache(&server, Duration::from_millis(200));
    let cancel = CancelSignal::new();

    let first = cache.get_token(&cancel).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = cache.get_token(&cancel).await.unwrap();

    assert!(second.expires_at() > first.expires_at());
    assert_eq!(cache.exchange_count(), 2);
}

#[tokio::test]
async fn test_empty_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "" })))
        .mount(&server)
        .await;

    let cache = token_cache(&server, Duration::from_secs(60));
    let err = cache.get_token(&CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, FetcherError::Auth(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_rejected_credential_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credential"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = token_cache(&server, Duration::from_secs(60));
    let err = cache.get_token(&CancelSignal::new()).await.unwrap_err();

    match err {
        FetcherError::Auth(message) => assert!(message.contains("invalid credential")),
        other => panic!("expected Auth, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_exchange_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_auth(&server, "tok-2", 1).await;

    let cache = token_cache(&server, Duration::from_secs(60));
    let cancel = CancelSignal::new();

    assert!(cache.get_token(&cancel).await.is_err());
    let token = cache.get_token(&cancel).await.unwrap();
    assert_eq!(token.value(), "tok-2");
}
