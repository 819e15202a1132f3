//! CLI parse: clap types for wiresync. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// wiresync - local artifact cache and remote reconciliation for wireframe projects
#[derive(Parser)]
#[command(name = "wiresync")]
#[command(about = "Keep locally cached wireframes in agreement with the remote project store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (for config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Access token for the remote project API
    #[arg(long, env = "WIRESYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge legacy storage partitions into the current schema
    Consolidate,
    /// Compare local and remote collections for a project
    Status {
        project: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Reconcile a project with the remote store
    Sync {
        project: String,
        /// Send the local collection to the merge endpoint and adopt its result
        #[arg(long)]
        two_way: bool,
    },
    /// Return a project's artifacts, generating them if none exist
    Artifacts {
        project: String,
        /// JSON file with project_name, description, user_stories and structured inputs
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Render visuals for every artifact of a project that lacks one
    Render { project: String },
    /// List cached artifacts of a project
    List {
        project: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Delete one cached artifact
    Delete { artifact_id: String },
    /// Print the effective configuration
    Config,
}
