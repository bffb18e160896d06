//! CLI error types and conversions

use crate::downloader::DownloadError;
use crate::output::SinkError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Download error
    #[error("sync error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] SinkError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl CliError {
    /// Whether the command stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            CliError::DownloadError(e) => e.is_cancelled(),
            CliError::OutputError(SinkError::Cancelled) => true,
            _ => false,
        }
    }
}
