//! CLI command-name contract for logging.

use crate::cli::parse::Commands;

/// Command name recorded on log events (e.g. "sync", "artifacts").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Consolidate => "consolidate",
        Commands::Status { .. } => "status",
        Commands::Sync { .. } => "sync",
        Commands::Artifacts { .. } => "artifacts",
        Commands::Render { .. } => "render",
        Commands::List { .. } => "list",
        Commands::Delete { .. } => "delete",
        Commands::Config => "config",
    }
}

/// Commands that need an authenticated remote store
pub fn requires_token(command: &Commands) -> bool {
    matches!(command, Commands::Status { .. } | Commands::Sync { .. })
}
