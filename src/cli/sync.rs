//! Sync command implementation

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

use super::CliError;
use crate::cancel::SharedCancel;
use crate::config::{
    RetryPolicy, SyncConfig, DEFAULT_MAX_PAGES_PER_BATCH, DEFAULT_MAX_PARALLEL_REQUESTS,
    DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE, DEFAULT_RETRY_DELAY_MS, DEFAULT_RUN_DEADLINE_SECS,
    DEFAULT_TOKEN_VALIDITY_SECS,
};
use crate::downloader::{DownloadError, SyncExecutor, SyncJob, SyncReport};
use crate::output::CsvSink;
use crate::registry::OrganizationRegistry;

/// Maximum allowed in-flight requests per batch
const MAX_CONCURRENCY: usize = 32;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Resolve `--org` given either a numeric id or a registry key (e.g. "POS_EAD").
fn resolve_org(value: &str, registry: &OrganizationRegistry) -> Result<i64, CliError> {
    if let Ok(id) = value.trim().parse::<i64>() {
        return Ok(id);
    }
    registry
        .find_by_key(value.trim())
        .map(|org| org.id)
        .ok_or_else(|| CliError::InvalidArgument(format!("Unknown organization: {value}")))
}

/// Enrollment Sync CLI
#[derive(Parser, Debug)]
#[command(name = "enrollment-sync")]
#[command(about = "Synchronize paginated enrollment listings into CSV targets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Base URL of the academic API
    #[arg(long, global = true, env = "API_BASE")]
    pub api_base: Option<String>,

    /// Static credential exchanged for bearer tokens
    #[arg(long, global = true, env = "USER_TOKEN", hide_env_values = true)]
    pub user_token: Option<String>,

    /// Directory receiving one CSV file per target
    #[arg(long, global = true, env = "OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Records per page
    #[arg(long, global = true, default_value_t = DEFAULT_PAGE_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=5000))]
    pub page_size: u32,

    /// Pages fetched per batch
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PAGES_PER_BATCH,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub max_pages_per_batch: u32,

    /// Maximum in-flight page requests within a batch (max: 32)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PARALLEL_REQUESTS,
          value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Maximum number of retries for failed requests (range: 0-20)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES,
          value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Base retry delay in milliseconds, doubled on every attempt
    #[arg(long, global = true, default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Bearer token validity window in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TOKEN_VALIDITY_SECS)]
    pub token_validity_secs: u64,

    /// Wall-clock budget for one sync run in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_RUN_DEADLINE_SECS)]
    pub deadline_secs: u64,

    /// Expose Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Run deadline requested on the command line.
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Build the sync configuration from flags and environment.
    pub fn build_config(&self) -> Result<SyncConfig, CliError> {
        let api_base = self
            .api_base
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError("API base URL missing (--api-base or API_BASE)".into())
            })?;
        let user_token = self
            .user_token
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(
                    "credential missing (--user-token or USER_TOKEN)".into(),
                )
            })?;

        let mut config = SyncConfig::new(api_base, user_token);
        config.page_size = self.page_size;
        config.max_pages_per_batch = self.max_pages_per_batch;
        config.max_parallel_requests = self.concurrency;
        config.retry = RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
        );
        config.token_validity = Duration::from_secs(self.token_validity_secs);
        config.run_deadline = self.run_deadline();
        config.output_dir = self.output_dir.clone();

        config.validate().map_err(CliError::ConfigurationError)?;
        Ok(config)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every enrollment of a period and overwrite its target
    Sync(SyncArgs),

    /// List known organizations
    Orgs(super::OrgsCommand),
}

/// Sync command arguments
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Academic period id (idPeriodoLetivo)
    #[arg(long)]
    pub period_id: i64,

    /// Enrollment status filter (e.g. ATIVA)
    #[arg(long)]
    pub status: Option<String>,

    /// Organization id or key (e.g. 20 or EAD)
    #[arg(long)]
    pub org: Option<String>,

    /// Explicit target name instead of the derived one
    #[arg(long)]
    pub target: Option<String>,

    /// Notice statuses searched for the period label, in order
    #[arg(long = "notice-status", value_delimiter = ',')]
    pub notice_statuses: Vec<String>,
}

impl SyncArgs {
    /// Build the job described by these arguments.
    pub fn job(&self, registry: &OrganizationRegistry) -> Result<SyncJob, CliError> {
        let mut job = SyncJob::new(self.period_id);
        if let Some(status) = &self.status {
            job = job.with_status(status.trim());
        }
        if let Some(org) = &self.org {
            job = job.with_org(resolve_org(org, registry)?);
        }
        if let Some(target) = &self.target {
            job = job.with_target(target.clone());
        }
        job.validate().map_err(CliError::InvalidArgument)?;
        Ok(job)
    }

    /// Execute the sync command.
    pub async fn execute(&self, cli: &Cli, cancel: SharedCancel) -> Result<(), CliError> {
        let mut config = cli.build_config()?;
        if !self.notice_statuses.is_empty() {
            config.notice_statuses = self.notice_statuses.clone();
        }

        let registry = OrganizationRegistry::builtin();
        let job = self.job(&registry)?;

        info!(
            period_id = job.period_id,
            status = ?job.status,
            org_id = ?job.org_id,
            output_dir = %config.output_dir.display(),
            "Starting enrollment sync"
        );

        let sink = CsvSink::new(&config.output_dir)?;
        let executor = SyncExecutor::new(config, sink)?.with_registry(registry);
        let result = executor.execute_with_cancel(job.clone(), cancel).await;

        match cli.output_format {
            OutputFormat::Json => output_json(&job, &result),
            OutputFormat::Human => output_human(&result),
        }

        result.map(|_| ()).map_err(CliError::DownloadError)
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// JSON summary of a sync run
fn summary_json(job: &SyncJob, result: &Result<SyncReport, DownloadError>) -> serde_json::Value {
    match result {
        Ok(report) => serde_json::json!({
            "success": true,
            "period_id": job.period_id,
            "status": job.status,
            "org_id": job.org_id,
            "target": report.target,
            "rows_written": report.rows_written,
            "total_pages": report.total_pages,
            "total_elements": report.total_elements,
            "failed_pages": report.failed_pages,
            "skipped_batches": report.skipped_batches,
            "unavailable_pages": report.unavailable_pages,
            "duration_ms": report.duration.as_millis() as u64,
            "error": null,
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "cancelled": e.is_cancelled(),
            "period_id": job.period_id,
            "status": job.status,
            "org_id": job.org_id,
            "error": e.to_string(),
        }),
    }
}

/// Output result as JSON
fn output_json(job: &SyncJob, result: &Result<SyncReport, DownloadError>) {
    println!("{}", summary_json(job, result));
}

/// Output result in human-readable format
fn output_human(result: &Result<SyncReport, DownloadError>) {
    match result {
        Ok(report) => {
            println!("\nSync completed successfully!");
            println!("Target: {}", report.target);
            println!("Rows written: {}", report.rows_written);
            println!(
                "Pages: {} (elements reported: {})",
                report.total_pages, report.total_elements
            );
            if !report.is_complete() {
                println!(
                    "Unavailable pages: {} ({} failed, {} skipped batches)",
                    report.unavailable_pages, report.failed_pages, report.skipped_batches
                );
            }
            println!("Duration: {:.1}s", report.duration.as_secs_f64());
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("\nSync cancelled before completion; target left unchanged.");
        }
        Err(e) => {
            eprintln!("\nSync failed!");
            eprintln!("Error: {e}");
            error!("Sync failed: {}", e);
        }
    }
}
