//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use enrollment_sync::config::{RetryPolicy, SyncConfig};
use enrollment_sync::output::{Row, Sink, SinkResult};
use enrollment_sync::CancelSignal;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const CREDENTIAL: &str = "secret-credential";
pub const ENROLLMENTS_PATH: &str = "/academico/matriculas";
pub const NOTICES_PATH: &str = "/academico/editais";
pub const AUTH_PATH: &str = "/auth/token";

/// Enrollment record as returned by the API.
pub fn enrollment(id: u64) -> Value {
    json!({
        "idMatricula": id,
        "aluno": format!("Aluno {id}"),
        "ra": format!("RA{id:06}"),
        "curso": "Pedagogia",
        "turma": "PED-2024",
        "status": "ATIVA",
        "periodoLetivo": "2024/1",
        "unidadeFisica": "Campus Santa Cruz",
        "organizacao": "EAD",
        "idOrg": 20,
        "dataMatricula": "2024-02-01T10:15:00",
        "dataAtivacao": "2024-02-03",
        "dataCadastro": null
    })
}

/// Paged envelope.
pub fn envelope(page: u32, page_size: u32, total: u64, elements: Vec<Value>) -> Value {
    let total_pages = if page_size == 0 {
        0
    } else {
        total.div_ceil(u64::from(page_size))
    };
    json!({
        "page": {
            "currentPage": page,
            "pageSize": page_size,
            "totalElements": total,
            "totalPages": total_pages
        },
        "elements": elements
    })
}

fn query_u32(request: &Request, key: &str) -> Option<u32> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
}

/// Serves `total` enrollments with ids `1..=total`; listed pages answer 503.
pub struct EnrollmentListing {
    pub total: u64,
    pub failing: HashSet<u32>,
    pub delay: Duration,
    pub hits: Arc<AtomicU32>,
}

impl EnrollmentListing {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            failing: HashSet::new(),
            delay: Duration::ZERO,
            hits: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.failing = pages.into_iter().collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Respond for EnrollmentListing {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let page = query_u32(request, "currentPage").unwrap_or(0);
        let page_size = query_u32(request, "pageSize").unwrap_or(500);

        if self.failing.contains(&page) {
            return ResponseTemplate::new(503)
                .set_body_string("upstream unavailable")
                .set_delay(self.delay);
        }

        let start = u64::from(page) * u64::from(page_size);
        let end = (start + u64::from(page_size)).min(self.total);
        let elements = (start..end).map(|i| enrollment(i + 1)).collect();

        ResponseTemplate::new(200)
            .set_body_json(envelope(page, page_size, self.total, elements))
            .set_delay(self.delay)
    }
}

/// Auth endpoint answering with `token`, expecting `times` exchanges.
pub async fn mount_auth(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(header("token", CREDENTIAL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
        .expect(times)
        .mount(server)
        .await;
}

/// Notices endpoint with no notices for any status.
pub async fn mount_no_notices(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(NOTICES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(0, 500, 0, vec![])))
        .mount(server)
        .await;
}

/// Enrollment listing endpoint.
pub async fn mount_listing(server: &MockServer, listing: EnrollmentListing) {
    Mock::given(method("GET"))
        .and(path(ENROLLMENTS_PATH))
        .respond_with(listing)
        .mount(server)
        .await;
}

/// Configuration pointed at the mock server with fast retries.
pub fn test_config(server: &MockServer) -> SyncConfig {
    let mut config = SyncConfig::new(server.uri(), CREDENTIAL);
    config.page_size = 100;
    config.max_pages_per_batch = 10;
    config.max_parallel_requests = 4;
    config.retry = RetryPolicy::new(2, Duration::from_millis(10));
    config.token_validity = Duration::from_secs(60);
    config.run_deadline = Duration::from_secs(30);
    config
}

/// One observed sink operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Ensure(String),
    Clear(String),
    SetHeaders(String, Vec<String>),
    Append(String, usize),
    Overwrite {
        target: String,
        headers: Vec<String>,
        rows: Vec<Row>,
    },
}

/// Sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn overwrites(&self) -> Vec<(String, Vec<String>, Vec<Row>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Overwrite {
                    target,
                    headers,
                    rows,
                } => Some((target, headers, rows)),
                _ => None,
            })
            .collect()
    }

    pub fn appends(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::Append(..)))
            .count()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn ensure_target_exists(&self, _: &CancelSignal, name: &str) -> SinkResult<()> {
        self.record(SinkCall::Ensure(name.to_string()));
        Ok(())
    }

    async fn clear(&self, _: &CancelSignal, name: &str) -> SinkResult<()> {
        self.record(SinkCall::Clear(name.to_string()));
        Ok(())
    }

    async fn set_headers(&self, _: &CancelSignal, name: &str, headers: &[String]) -> SinkResult<()> {
        self.record(SinkCall::SetHeaders(name.to_string(), headers.to_vec()));
        Ok(())
    }

    async fn append_rows(&self, _: &CancelSignal, name: &str, rows: &[Row]) -> SinkResult<()> {
        self.record(SinkCall::Append(name.to_string(), rows.len()));
        Ok(())
    }

    async fn overwrite_all(
        &self,
        _: &CancelSignal,
        name: &str,
        headers: &[String],
        rows: &[Row],
    ) -> SinkResult<()> {
        self.record(SinkCall::Overwrite {
            target: name.to_string(),
            headers: headers.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(())
    }
}
