//! # Enrollment Sync Library
//!
//! Synchronizes a large, paginated enrollment collection exposed by an
//! academic-management REST API into a tabular sink.
//!
//! ## Features
//!
//! - **Authenticated access**: bearer tokens cached for a fixed validity window,
//!   with at most one token exchange in flight at any time
//! - **Retry with backoff**: transport errors, 429 and 5xx responses are retried
//!   with exponential delays
//! - **Bounded concurrency**: pages are fetched in batches by a worker pool that
//!   never exceeds the configured number of in-flight requests
//! - **Partial-failure accounting**: failed pages and skipped batches are
//!   counted and reported instead of failing the whole run
//! - **Cooperative cancellation**: a deadline or Ctrl+C stops every layer and is
//!   reported distinctly from ordinary failures
//!
//! ## Quick Start
//!
//! ```no_run
//! use enrollment_sync::config::SyncConfig;
//! use enrollment_sync::downloader::{SyncExecutor, SyncJob};
//! use enrollment_sync::output::csv::CsvSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::new("https://api.example.com", "user-token");
//! let sink = CsvSink::new(&config.output_dir)?;
//! let executor = SyncExecutor::new(config, sink)?;
//!
//! let job = SyncJob::new(2024).with_status("ATIVA");
//! let report = executor.execute(job).await?;
//! println!("{} rows written to {}", report.rows_written, report.target);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`cancel`] - Shared cancellation signal with deadline support
//! - [`fetcher`] - Backoff executor, token cache, HTTP client and page fetcher
//! - [`downloader`] - Batch orchestrator, retrieval driver and sync job
//! - [`output`] - Sink capability trait, row mapping and the CSV sink
//! - [`registry`] - Organization names used for target naming

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Cooperative cancellation
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// Configuration defaults
pub mod config;

/// Batch orchestration and run driving
pub mod downloader;

/// Upstream API access
pub mod fetcher;

/// Metrics emission
pub mod metrics;

/// Sinks and row mapping
pub mod output;

/// Organization registry
pub mod registry;

pub use cancel::{CancelSignal, SharedCancel};

/// Query filters applied to every page request of one run.
///
/// Ordered so generated query strings are deterministic.
pub type Filters = BTreeMap<String, String>;

/// Pagination metadata reported by the upstream API with every page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Zero-based index of this page
    pub current_page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Total records across all pages
    pub total_elements: u64,
    /// Total number of pages
    pub total_pages: u32,
}

impl PageInfo {
    /// Whether the collection holds nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.total_pages == 0 || self.total_elements == 0
    }
}

/// Response envelope shared by every paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    /// Pagination metadata; absent on malformed responses
    #[serde(default)]
    pub page: Option<PageInfo>,
    /// Records of this page, in upstream order
    #[serde(default = "Vec::new")]
    pub elements: Vec<T>,
}

/// Response of the token exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Bearer token; empty means authentication failed
    #[serde(default)]
    pub token: String,
}

/// One enrollment record as returned by the enrollment listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Enrollment {
    /// Enrollment identifier
    #[serde(rename = "idMatricula", default, deserialize_with = "null_as_default")]
    pub id: i64,
    /// Student name
    #[serde(rename = "aluno", default)]
    pub student: Option<String>,
    /// Student registration number (RA)
    #[serde(default)]
    pub ra: Option<String>,
    /// Course name
    #[serde(rename = "curso", default)]
    pub course: Option<String>,
    /// Class name
    #[serde(rename = "turma", default)]
    pub class: Option<String>,
    /// Enrollment status
    #[serde(default)]
    pub status: Option<String>,
    /// Academic term label
    #[serde(rename = "periodoLetivo", default)]
    pub academic_term: Option<String>,
    /// Physical unit (campus)
    #[serde(rename = "unidadeFisica", default)]
    pub physical_unit: Option<String>,
    /// Organization name
    #[serde(rename = "organizacao", default)]
    pub organization: Option<String>,
    /// Organization identifier
    #[serde(rename = "idOrg", default, deserialize_with = "null_as_default")]
    pub org_id: i64,
    /// Enrollment date
    #[serde(
        rename = "dataMatricula",
        default,
        deserialize_with = "deserialize_api_date"
    )]
    pub enrolled_on: Option<NaiveDate>,
    /// Activation date
    #[serde(
        rename = "dataAtivacao",
        default,
        deserialize_with = "deserialize_api_date"
    )]
    pub activated_on: Option<NaiveDate>,
    /// Registration date
    #[serde(
        rename = "dataCadastro",
        default,
        deserialize_with = "deserialize_api_date"
    )]
    pub created_on: Option<NaiveDate>,
}

/// One process notice, which links an academic period to its label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Period {
    /// Organization identifier
    #[serde(rename = "idOrg", default, deserialize_with = "null_as_default")]
    pub org_id: i64,
    /// Organization name
    #[serde(rename = "organizacao", default, deserialize_with = "null_as_default")]
    pub organization: String,
    /// Academic period identifier
    #[serde(rename = "idPeriodoLetivo", default, deserialize_with = "null_as_default")]
    pub period_id: i64,
    /// Academic period label (e.g. "2024/1")
    #[serde(rename = "periodoLetivo", default, deserialize_with = "null_as_default")]
    pub period_label: String,
    /// Notice identifier
    #[serde(rename = "idEdital", default, deserialize_with = "null_as_default")]
    pub notice_id: i64,
    /// Notice description
    #[serde(rename = "descricao", default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Grade formula
    #[serde(rename = "formulaNota", default, deserialize_with = "null_as_default")]
    pub grade_formula: String,
    /// Notice status
    #[serde(rename = "statusEdital", default, deserialize_with = "null_as_default")]
    pub notice_status: String,
    /// First day of the notice
    #[serde(rename = "dataInicio", default, deserialize_with = "deserialize_api_date")]
    pub starts_on: Option<NaiveDate>,
    /// Last day of the notice
    #[serde(rename = "dataTermino", default, deserialize_with = "deserialize_api_date")]
    pub ends_on: Option<NaiveDate>,
    /// Payment slip due date
    #[serde(
        rename = "dataVencimentoBoleto",
        default,
        deserialize_with = "deserialize_api_date"
    )]
    pub payment_due_on: Option<NaiveDate>,
    /// Payment method
    #[serde(rename = "meioPagamento", default, deserialize_with = "null_as_default")]
    pub payment_method: String,
    /// Whether payment slips use a dynamic due date (0/1)
    #[serde(
        rename = "utilizarVencimentoDinamicoBoleto",
        default,
        deserialize_with = "null_as_default"
    )]
    pub dynamic_due_date: i64,
    /// Days until a dynamic due date; the API sends numbers, strings or null
    #[serde(rename = "diasVencimentoDinamicoBoleto", default)]
    pub dynamic_due_days: Option<serde_json::Value>,
}

/// Parse an API date. Accepts `YYYY-MM-DD`, optionally followed by a time
/// part introduced by `T` or a space (`2024-02-01T10:00:00-0300`); empty or
/// null means no date.
pub fn parse_api_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let split = raw.char_indices().nth(10).map_or(raw.len(), |(i, _)| i);
    let (date_part, rest) = raw.split_at(split);
    if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
        return Err(format!("invalid date '{raw}': trailing input after date"));
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| format!("invalid date '{raw}': {e}"))
}

/// Decode `null` as the field type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_api_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_api_date(&s).map_err(serde::de::Error::custom),
    }
}
