//! Generation Orchestrator
//!
//! Top-level entry point for obtaining a project's artifacts. Existing work is
//! returned as-is: pulled from the remote store when authenticated, otherwise
//! served from the local cache. Only when neither side has anything is a new
//! generation round driven through the retry executor. A failed round is
//! reported, never papered over with substitute content.

use crate::cache::ArtifactCache;
use crate::error::{ApiError, Stage};
use crate::remote::{
    ensure_unique_ids, GenerationService, HttpRemoteClient, LocalGenerationClient, RemoteConfig, RemoteStore,
};
use crate::render::{RenderReport, VisualRenderer};
use crate::retry::RetryExecutor;
use crate::sync::{ReconcileMode, ReconcileOutcome, SyncReconciler, SyncStatus};
use crate::types::{Artifact, GenerationInput, Origin, ProjectId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Remote collaborators available to the orchestrator
///
/// A present `store` means the caller is authenticated.
#[derive(Clone)]
pub struct Backends {
    pub store: Option<Arc<dyn RemoteStore>>,
    pub generator: Arc<dyn GenerationService>,
}

impl Backends {
    /// Authenticated client when a token is configured, local generation endpoint otherwise.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, ApiError> {
        match config.token.as_deref() {
            Some(token) => {
                let client = Arc::new(HttpRemoteClient::new(config, token)?);
                let store: Arc<dyn RemoteStore> = client.clone();
                Ok(Self {
                    store: Some(store),
                    generator: client,
                })
            }
            None => Ok(Self {
                store: None,
                generator: Arc::new(LocalGenerationClient::new(config)?),
            }),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_some()
    }
}

/// Where the returned artifacts came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    Database,
    LocalCache,
    Generated,
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSource::Database => write!(f, "database"),
            ArtifactSource::LocalCache => write!(f, "local_cache"),
            ArtifactSource::Generated => write!(f, "generated"),
        }
    }
}

/// Artifacts for a project plus how they were obtained
#[derive(Debug, Clone)]
pub struct ArtifactsOutcome {
    pub artifacts: Vec<Artifact>,
    pub source: ArtifactSource,
    /// Freshly generated artifacts were pushed to the remote store
    pub auto_synced: bool,
    /// Generation attempts made; zero when nothing was generated
    pub attempts: u32,
}

/// Drives reconciliation, generation and rendering for projects
pub struct GenerationOrchestrator {
    cache: Arc<dyn ArtifactCache>,
    backends: Backends,
    executor: Arc<RetryExecutor>,
    reconciler: Option<SyncReconciler>,
    renderer: VisualRenderer,
}

impl GenerationOrchestrator {
    pub fn new(
        cache: Arc<dyn ArtifactCache>,
        backends: Backends,
        executor: Arc<RetryExecutor>,
    ) -> Self {
        let reconciler = backends
            .store
            .clone()
            .map(|store| SyncReconciler::new(cache.clone(), store));
        let renderer =
            VisualRenderer::new(cache.clone(), backends.generator.clone(), executor.clone());
        Self {
            cache,
            backends,
            executor,
            reconciler,
            renderer,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.backends.is_authenticated()
    }

    pub fn cache(&self) -> &Arc<dyn ArtifactCache> {
        &self.cache
    }

    pub fn renderer(&self) -> &VisualRenderer {
        &self.renderer
    }

    /// Return the project's artifacts, generating them only if none exist anywhere.
    pub async fn artifacts_for(
        &self,
        input: &GenerationInput,
        cancel: &CancellationToken,
    ) -> Result<ArtifactsOutcome, ApiError> {
        let project_id = &input.project_id;

        if let Some(reconciler) = &self.reconciler {
            let outcome = reconciler
                .reconcile(project_id, ReconcileMode::PullPreferring, cancel)
                .await
                .map_err(|e| self.stage_failed(Stage::Sync, project_id, e))?;
            if matches!(outcome, ReconcileOutcome::Pulled { count } if count > 0) {
                return self.existing(project_id, ArtifactSource::Database);
            }
        }

        let local = self.cache.list_by_project(project_id)?;
        if !local.is_empty() {
            info!(
                project_id = %project_id,
                source = %ArtifactSource::LocalCache,
                count = local.len(),
                "Returning cached artifacts"
            );
            return Ok(ArtifactsOutcome {
                artifacts: local,
                source: ArtifactSource::LocalCache,
                auto_synced: false,
                attempts: 0,
            });
        }

        self.generate(input, cancel).await
    }

    /// Run one reconciliation; requires an authenticated remote store.
    pub async fn sync(
        &self,
        project_id: &ProjectId,
        mode: ReconcileMode,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ApiError> {
        self.require_reconciler()?
            .reconcile(project_id, mode, cancel)
            .await
    }

    pub async fn status(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<SyncStatus, ApiError> {
        self.require_reconciler()?.status(project_id, cancel).await
    }

    /// Render visuals for every artifact of the project that lacks one.
    pub async fn render_visuals(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<RenderReport, ApiError> {
        self.renderer.render_project(project_id, cancel).await
    }

    async fn generate(
        &self,
        input: &GenerationInput,
        cancel: &CancellationToken,
    ) -> Result<ArtifactsOutcome, ApiError> {
        let project_id = &input.project_id;
        info!(
            project_id = %project_id,
            authenticated = self.is_authenticated(),
            "No artifacts found; starting generation round"
        );

        let generator = &self.backends.generator;
        let generated = self
            .executor
            .execute("generate", cancel, move |_| async move {
                generator.generate(input).await?.into_artifacts()
            })
            .await
            .map_err(|e| self.stage_failed(Stage::Generation, project_id, e))?;

        ensure_unique_ids(&generated.value)
            .map_err(|e| self.stage_failed(Stage::Generation, project_id, e))?;
        for artifact in generated.value {
            self.cache
                .create(project_id, artifact.into_new_artifact(Origin::Local))
                .map_err(|e| self.stage_failed(Stage::Generation, project_id, e.into()))?;
        }

        let mut auto_synced = false;
        if let Some(reconciler) = &self.reconciler {
            reconciler
                .reconcile(project_id, ReconcileMode::PushLocal, cancel)
                .await
                .map_err(|e| self.stage_failed(Stage::Sync, project_id, e))?;
            auto_synced = true;
        }

        let artifacts = self.cache.list_by_project(project_id)?;
        info!(
            project_id = %project_id,
            source = %ArtifactSource::Generated,
            count = artifacts.len(),
            attempts = generated.attempts,
            auto_synced,
            "Generation round finished"
        );
        Ok(ArtifactsOutcome {
            artifacts,
            source: ArtifactSource::Generated,
            auto_synced,
            attempts: generated.attempts,
        })
    }

    fn existing(
        &self,
        project_id: &ProjectId,
        source: ArtifactSource,
    ) -> Result<ArtifactsOutcome, ApiError> {
        let artifacts = self.cache.list_by_project(project_id)?;
        info!(
            project_id = %project_id,
            source = %source,
            count = artifacts.len(),
            "Returning synced artifacts"
        );
        Ok(ArtifactsOutcome {
            artifacts,
            source,
            auto_synced: false,
            attempts: 0,
        })
    }

    fn require_reconciler(&self) -> Result<&SyncReconciler, ApiError> {
        self.reconciler.as_ref().ok_or_else(|| {
            ApiError::Unauthorized("remote sync requires an access token".to_string())
        })
    }

    /// Wrap a terminal failure with its stage and the local artifacts still present.
    fn stage_failed(&self, stage: Stage, project_id: &ProjectId, cause: ApiError) -> ApiError {
        if matches!(cause, ApiError::Cancelled) {
            return cause;
        }
        let local_artifacts = self
            .cache
            .list_by_project(project_id)
            .map(|artifacts| artifacts.len())
            .unwrap_or(0);
        error!(
            project_id = %project_id,
            stage = %stage,
            local_artifacts,
            error = %cause,
            "Generation round failed"
        );
        ApiError::StageFailed {
            stage,
            local_artifacts,
            source: Box::new(cause),
        }
    }
}
