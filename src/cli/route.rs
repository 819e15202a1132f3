//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cache::{ArtifactCache, SledArtifactCache};
use crate::config::{ConfigLoader, WiresyncConfig};
use crate::error::{ApiError, StorageError};
use crate::limiter::RateLimiter;
use crate::orchestrator::{Backends, GenerationOrchestrator};
use crate::retry::RetryExecutor;
use crate::sync::ReconcileMode;
use crate::types::{ArtifactId, GenerationInput, ProjectId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::help::{command_name, requires_token};
use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{
    format_artifact_table, format_artifacts_outcome, format_artifacts_outcome_json,
    format_consolidation_report, format_reconcile_outcome, format_render_report,
    format_sync_status_text, to_json,
};

/// Runtime context for CLI execution: effective config, cache and orchestrator.
pub struct RunContext {
    config: WiresyncConfig,
    cache: Arc<SledArtifactCache>,
    orchestrator: GenerationOrchestrator,
}

impl RunContext {
    /// Load config (explicit file or workspace layering), then build from it.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        token: Option<String>,
    ) -> Result<Self, ApiError> {
        let config = load_config(&workspace_root, config_path.as_deref(), token)?;
        Self::from_config(config)
    }

    /// Open and consolidate the cache, then wire the backends.
    pub fn from_config(config: WiresyncConfig) -> Result<Self, ApiError> {
        std::fs::create_dir_all(&config.storage.cache_path).map_err(|e| {
            StorageError::Io(format!(
                "Failed to create cache directory {}: {}",
                config.storage.cache_path.display(),
                e
            ))
        })?;
        let cache = Arc::new(SledArtifactCache::new(&config.storage.cache_path)?);

        let report = cache.consolidate()?;
        for parse_error in &report.errors {
            warn!(
                partition = %parse_error.partition,
                key = %parse_error.key,
                error = %parse_error.message,
                "Legacy partition left in place"
            );
        }

        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let executor = Arc::new(RetryExecutor::new(limiter, config.retry.clone()));
        let backends = Backends::from_config(&config.remote)?;
        let orchestrator = GenerationOrchestrator::new(cache.clone(), backends, executor);

        Ok(Self {
            config,
            cache,
            orchestrator,
        })
    }

    pub fn config(&self) -> &WiresyncConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(
        &self,
        command: &Commands,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        let name = command_name(command);
        if requires_token(command) && !self.orchestrator.is_authenticated() {
            return Err(ApiError::Unauthorized(format!(
                "'{}' needs an access token",
                name
            )));
        }

        let started = Instant::now();
        let result = self.execute_inner(command, cancel).await;
        if let Err(e) = self.cache.flush() {
            warn!(error = %e, "Failed to flush cache");
        }
        info!(
            command = name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    async fn execute_inner(
        &self,
        command: &Commands,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        match command {
            Commands::Consolidate => {
                let report = self.cache.consolidate()?;
                Ok(format_consolidation_report(&report))
            }
            Commands::Status { project, format } => {
                let status = self
                    .orchestrator
                    .status(&ProjectId::from(project.as_str()), cancel)
                    .await?;
                match format {
                    OutputFormat::Json => to_json(&status),
                    OutputFormat::Text => Ok(format_sync_status_text(project, &status)),
                }
            }
            Commands::Sync { project, two_way } => {
                let mode = if *two_way {
                    ReconcileMode::TwoWay
                } else {
                    ReconcileMode::PullPreferring
                };
                let outcome = self
                    .orchestrator
                    .sync(&ProjectId::from(project.as_str()), mode, cancel)
                    .await?;
                Ok(format_reconcile_outcome(project, &outcome))
            }
            Commands::Artifacts {
                project,
                input,
                format,
            } => {
                let request = read_generation_input(project, input)?;
                let outcome = self.orchestrator.artifacts_for(&request, cancel).await?;
                match format {
                    OutputFormat::Json => format_artifacts_outcome_json(&outcome),
                    OutputFormat::Text => Ok(format_artifacts_outcome(&outcome)),
                }
            }
            Commands::Render { project } => {
                let report = self
                    .orchestrator
                    .render_visuals(&ProjectId::from(project.as_str()), cancel)
                    .await?;
                Ok(format_render_report(project, &report))
            }
            Commands::List { project, format } => {
                let artifacts = self
                    .cache
                    .list_by_project(&ProjectId::from(project.as_str()))?;
                match format {
                    OutputFormat::Json => to_json(&artifacts),
                    OutputFormat::Text => Ok(format_artifact_table(&artifacts)),
                }
            }
            Commands::Delete { artifact_id } => {
                let id = ArtifactId::from(artifact_id.as_str());
                if self.cache.delete(&id)? {
                    Ok(format!("Deleted artifact {}", id))
                } else {
                    Err(StorageError::ArtifactNotFound(id).into())
                }
            }
            Commands::Config => toml::to_string_pretty(&self.config.redacted())
                .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e))),
        }
    }
}

/// Resolve the effective configuration; an explicit token wins over config and environment.
pub fn load_config(
    workspace_root: &Path,
    config_path: Option<&Path>,
    token: Option<String>,
) -> Result<WiresyncConfig, ApiError> {
    let mut config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(workspace_root)?,
    };
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        config.remote.token = Some(token);
    }

    config.validate().map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ApiError::ConfigError(format!(
            "Configuration validation failed:\n{}",
            messages.join("\n")
        ))
    })?;
    Ok(config)
}

/// Read a generation request file; the project id always comes from the command line.
fn read_generation_input(project: &str, path: &Path) -> Result<GenerationInput, ApiError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ApiError::Validation(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let mut fields: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| ApiError::Validation(format!("Invalid input file {}: {}", path.display(), e)))?;
    fields.insert(
        "project_id".to_string(),
        serde_json::Value::String(project.to_string()),
    );
    fields
        .entry("project_name")
        .or_insert_with(|| serde_json::Value::String(project.to_string()));
    serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| ApiError::Validation(format!("Invalid input file {}: {}", path.display(), e)))
}
