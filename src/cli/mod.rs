//! CLI command implementations

pub mod error;
pub mod orgs;
pub mod sync;

pub use error::CliError;
pub use orgs::OrgsCommand;
pub use sync::{Cli, Commands, OutputFormat, SyncArgs};
