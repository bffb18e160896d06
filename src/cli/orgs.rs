//! CLI command for listing known organizations

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use crate::registry::{OrganizationRegistry, DEFAULT_ORGANIZATION_NAME};

/// Orgs subcommand
#[derive(Debug, Args)]
pub struct OrgsCommand {
    /// Output format
    #[arg(long, default_value = "human")]
    format: ListFormat,
}

/// Output format for the orgs command
#[derive(Debug, Clone, clap::ValueEnum)]
enum ListFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl OrgsCommand {
    /// Execute the orgs command
    pub fn execute(&self) -> Result<()> {
        let registry = OrganizationRegistry::builtin();
        let orgs = registry.list_all();

        match self.format {
            ListFormat::Json => {
                let entries: Vec<_> = orgs
                    .iter()
                    .map(|org| json!({"key": org.key, "id": org.id, "name": org.name}))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "organizations": entries,
                        "default": DEFAULT_ORGANIZATION_NAME,
                    }))
                    .context("Failed to serialize organizations to JSON")?
                );
            }
            ListFormat::Human => {
                println!("Found {} organizations:\n", orgs.len());
                for org in orgs {
                    println!("{:>3} | {:<15} | {}", org.id, org.key, org.name);
                }
                println!("\nUnknown organizations are written as \"{DEFAULT_ORGANIZATION_NAME}\".");
            }
        }

        Ok(())
    }
}
