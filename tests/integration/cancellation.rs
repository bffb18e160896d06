//! Cancellation and run deadline handling

use enrollment_sync::config::RetryPolicy;
use enrollment_sync::downloader::{DownloadError, SyncExecutor, SyncJob};
use enrollment_sync::fetcher::{ApiClient, FetcherError};
use enrollment_sync::CancelSignal;
use reqwest::Method;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    mount_auth, mount_listing, mount_no_notices, test_config, EnrollmentListing, RecordingSink,
    ENROLLMENTS_PATH,
};

#[tokio::test]
async fn test_cancel_mid_run_leaves_sink_untouched() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;
    mount_no_notices(&server).await;
    mount_listing(
        &server,
        EnrollmentListing::new(5000).with_delay(Duration::from_millis(200)),
    )
    .await;

    let executor = SyncExecutor::new(test_config(&server), RecordingSink::default()).unwrap();
    let cancel = CancelSignal::shared();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = executor
        .execute_with_cancel(SyncJob::new(77), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Cancelled), "unexpected error: {err}");
    assert!(executor.sink().inner().calls().is_empty());
}

#[tokio::test]
async fn test_already_cancelled_signal_fetches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let executor = SyncExecutor::new(test_config(&server), RecordingSink::default()).unwrap();
    let cancel = CancelSignal::shared();
    cancel.cancel();

    let err = executor
        .execute_with_cancel(SyncJob::new(77).with_target("fixed"), cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(executor.sink().inner().calls().is_empty());
}

#[tokio::test]
async fn test_deadline_interrupts_backoff_sleep() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.retry = RetryPolicy::new(5, Duration::from_secs(10));
    config.run_deadline = Duration::from_millis(300);

    let executor = SyncExecutor::new(config, RecordingSink::default()).unwrap();
    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        executor.execute(SyncJob::new(77).with_target("fixed")),
    )
    .await
    .expect("deadline should cut the 10s backoff short");

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(executor.sink().inner().calls().is_empty());
}

#[tokio::test]
async fn test_cancel_abandons_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client =
        ApiClient::new(server.uri(), RetryPolicy::new(3, Duration::from_millis(10))).unwrap();
    let cancel = CancelSignal::shared();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = client
        .request(&cancel, Method::GET, ENROLLMENTS_PATH, &[], &[])
        .await;

    assert!(matches!(result, Err(FetcherError::Cancelled)), "unexpected result: {result:?}");
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "request outlived cancellation: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_deadline_cuts_slow_page_short() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;
    mount_listing(
        &server,
        EnrollmentListing::new(100).with_delay(Duration::from_secs(5)),
    )
    .await;

    let mut config = test_config(&server);
    config.run_deadline = Duration::from_millis(200);

    let executor = SyncExecutor::new(config, RecordingSink::default()).unwrap();
    let started = Instant::now();
    let result = executor.execute(SyncJob::new(77).with_target("fixed")).await;

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(executor.sink().inner().calls().is_empty());
}
