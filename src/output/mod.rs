//! Tabular output sinks
//!
//! A [`Sink`] stores rows under named targets (a CSV file, a spreadsheet
//! tab). The sync job only ever calls [`Sink::overwrite_all`]; the other
//! operations exist for callers that manage a target incrementally.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use crate::cancel::CancelSignal;
use crate::fetcher::Classify;

pub mod csv;
pub mod retrying;
pub mod rows;

pub use csv::CsvSink;
pub use retrying::RetryingSink;
pub use rows::{enrollment_headers, enrollment_row, ENROLLMENT_HEADERS};

/// Output sink errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// Operation stopped by the run cancellation signal
    #[error("operation cancelled")]
    Cancelled,

    /// Failure that may succeed on a later attempt
    #[error("transient sink error: {0}")]
    Transient(String),

    /// Target does not exist and the operation does not create it
    #[error("target not found: {0}")]
    TargetMissing(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    Csv(String),
}

impl SinkError {
    /// Classify an IO error; interrupted and timed-out operations are transient.
    pub fn from_io(context: &str, error: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                SinkError::Transient(format!("{context}: {error}"))
            }
            ErrorKind::NotFound => SinkError::TargetMissing(format!("{context}: {error}")),
            _ => SinkError::Io(format!("{context}: {error}")),
        }
    }
}

impl Classify for SinkError {
    fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }

    fn cancelled() -> Self {
        SinkError::Cancelled
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// A single cell of a tabular row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// Absent value; rendered as an empty cell
    Empty,
    /// Free text
    Text(String),
    /// Integer identifier or count
    Integer(i64),
    /// Calendar date, rendered as `YYYY-MM-DD`
    Date(NaiveDate),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Integer(value) => write!(f, "{value}"),
            CellValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::Text).unwrap_or(CellValue::Empty)
    }
}

impl From<Option<NaiveDate>> for CellValue {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(CellValue::Date).unwrap_or(CellValue::Empty)
    }
}

/// Ordered cells of one output row.
pub type Row = Vec<CellValue>;

/// Named-target tabular store.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Create the target if it does not exist yet.
    async fn ensure_target_exists(&self, cancel: &CancelSignal, name: &str) -> SinkResult<()>;

    /// Remove every row of an existing target.
    async fn clear(&self, cancel: &CancelSignal, name: &str) -> SinkResult<()>;

    /// Replace the first row of an existing target with `headers`.
    async fn set_headers(
        &self,
        cancel: &CancelSignal,
        name: &str,
        headers: &[String],
    ) -> SinkResult<()>;

    /// Append rows after the current last row. Zero rows is a no-op.
    async fn append_rows(&self, cancel: &CancelSignal, name: &str, rows: &[Row]) -> SinkResult<()>;

    /// Ensure the target, clear it, then write `headers` followed by `rows`.
    ///
    /// With zero rows the target ends up holding only the header row.
    async fn overwrite_all(
        &self,
        cancel: &CancelSignal,
        name: &str,
        headers: &[String],
        rows: &[Row],
    ) -> SinkResult<()> {
        self.ensure_target_exists(cancel, name).await?;
        self.clear(cancel, name).await?;
        self.set_headers(cancel, name, headers).await?;
        self.append_rows(cancel, name, rows).await
    }
}
