//! Sink operation semantics

use async_trait::async_trait;
use enrollment_sync::config::RetryPolicy;
use enrollment_sync::fetcher::Backoff;
use enrollment_sync::output::{CellValue, CsvSink, RetryingSink, Row, Sink, SinkError, SinkResult};
use enrollment_sync::CancelSignal;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Implements only the four primitive operations and logs them in order.
#[derive(Default)]
struct PrimitiveSink {
    log: Mutex<Vec<String>>,
}

impl PrimitiveSink {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Sink for PrimitiveSink {
    async fn ensure_target_exists(&self, _: &CancelSignal, name: &str) -> SinkResult<()> {
        self.push(format!("ensure {name}"));
        Ok(())
    }

    async fn clear(&self, _: &CancelSignal, name: &str) -> SinkResult<()> {
        self.push(format!("clear {name}"));
        Ok(())
    }

    async fn set_headers(&self, _: &CancelSignal, name: &str, headers: &[String]) -> SinkResult<()> {
        self.push(format!("headers {name} {}", headers.join("|")));
        Ok(())
    }

    async fn append_rows(&self, _: &CancelSignal, name: &str, rows: &[Row]) -> SinkResult<()> {
        self.push(format!("append {name} {}", rows.len()));
        Ok(())
    }
}

fn headers() -> Vec<String> {
    vec!["idMatricula".to_string(), "aluno".to_string()]
}

fn row(id: i64, name: &str) -> Row {
    vec![CellValue::Integer(id), CellValue::Text(name.to_string())]
}

fn retrying<S: Sink>(inner: S) -> RetryingSink<S> {
    RetryingSink::new(inner, Backoff::new(RetryPolicy::new(2, Duration::from_millis(1))))
}

#[tokio::test]
async fn test_overwrite_composes_primitives_in_order() {
    let sink = PrimitiveSink::default();
    sink.overwrite_all(&CancelSignal::new(), "t", &headers(), &[row(1, "Ana"), row(2, "Bia")])
        .await
        .unwrap();

    assert_eq!(
        sink.log(),
        vec![
            "ensure t".to_string(),
            "clear t".to_string(),
            "headers t idMatricula|aluno".to_string(),
            "append t 2".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_retrying_sink_skips_empty_append() {
    let sink = retrying(PrimitiveSink::default());
    sink.append_rows(&CancelSignal::new(), "t", &[]).await.unwrap();
    assert!(sink.inner().log().is_empty());

    sink.append_rows(&CancelSignal::new(), "t", &[row(1, "Ana")])
        .await
        .unwrap();
    assert_eq!(sink.inner().log(), vec!["append t 1".to_string()]);
}

#[tokio::test]
async fn test_csv_clear_requires_existing_target() {
    let dir = TempDir::new().unwrap();
    let sink = CsvSink::new(dir.path()).unwrap();

    let err = sink.clear(&CancelSignal::new(), "absent").await.unwrap_err();
    assert!(matches!(err, SinkError::TargetMissing(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_csv_overwrite_with_no_rows_leaves_header_only() {
    let dir = TempDir::new().unwrap();
    let sink = CsvSink::new(dir.path()).unwrap();
    let cancel = CancelSignal::new();

    sink.overwrite_all(&cancel, "Matrículas", &headers(), &[row(1, "Ana"), row(2, "Bia")])
        .await
        .unwrap();
    sink.overwrite_all(&cancel, "Matrículas", &headers(), &[])
        .await
        .unwrap();

    let content = std::fs::read_to_string(sink.path_for("Matrículas")).unwrap();
    assert_eq!(content.lines().collect::<Vec<_>>(), vec!["idMatricula,aluno"]);
}

#[tokio::test]
async fn test_csv_primitives_build_table() {
    let dir = TempDir::new().unwrap();
    let sink = CsvSink::new(dir.path()).unwrap();
    let cancel = CancelSignal::new();

    sink.ensure_target_exists(&cancel, "t").await.unwrap();
    sink.set_headers(&cancel, "t", &headers()).await.unwrap();
    sink.append_rows(&cancel, "t", &[row(1, "Ana")]).await.unwrap();
    sink.append_rows(&cancel, "t", &[row(2, "Bia, Jr.")]).await.unwrap();
    sink.set_headers(&cancel, "t", &["id".to_string(), "nome".to_string()])
        .await
        .unwrap();

    let content = std::fs::read_to_string(sink.path_for("t")).unwrap();
    assert_eq!(
        content.lines().collect::<Vec<_>>(),
        vec!["id,nome", "1,Ana", "2,\"Bia, Jr.\""]
    );
}

#[tokio::test]
async fn test_cancelled_signal_stops_csv_writes() {
    let dir = TempDir::new().unwrap();
    let sink = CsvSink::new(dir.path()).unwrap();
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = sink
        .overwrite_all(&cancel, "t", &headers(), &[row(1, "Ana")])
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Cancelled));
    assert!(!sink.path_for("t").exists());
}
