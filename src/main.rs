//! Main entry point for the enrollment-sync CLI

use clap::Parser;
use enrollment_sync::cli::{Cli, CliError, Commands};
use enrollment_sync::metrics::init_metrics;
use enrollment_sync::CancelSignal;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Exit code used when the run was cancelled (Ctrl+C or deadline)
const EXIT_CANCELLED: i32 = 130;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("enrollment_sync=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            warn!("Metrics disabled: {}", e);
        }
    }

    // One signal per invocation: the run deadline or Ctrl+C, whichever comes first.
    let cancel = CancelSignal::with_deadline(cli.run_deadline());
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - cancelling sync, target will be left unchanged");
                cancel.cancel();
            }
        }
    });

    let result: anyhow::Result<()> = match cli.command {
        Commands::Sync(ref args) => args
            .execute(&cli, cancel.clone())
            .await
            .map_err(anyhow::Error::from),
        Commands::Orgs(ref orgs) => orgs.execute(),
    };

    if let Err(e) = result {
        if e.downcast_ref::<CliError>().is_some_and(CliError::is_cancelled) {
            error!("Command cancelled: {}", e);
            std::process::exit(EXIT_CANCELLED);
        }
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
