//! Visual rendering queue
//!
//! Secondary renderings are requested per artifact. Concurrent requests for the
//! same artifact share one remote call; every remote call goes through the
//! shared retry executor and therefore the shared rate limiter.

use crate::cache::ArtifactCache;
use crate::error::{ApiError, StorageError};
use crate::remote::GenerationService;
use crate::retry::RetryExecutor;
use crate::types::{ArtifactId, ProjectId, RenderedVisual};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type RenderResult = Result<RenderedVisual, ApiError>;

/// Result of rendering every pending artifact of a project
#[derive(Debug, Default)]
pub struct RenderReport {
    pub rendered: Vec<ArtifactId>,
    pub failed: Vec<(ArtifactId, ApiError)>,
}

impl RenderReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Single-flight renderer keyed by artifact id
pub struct VisualRenderer {
    cache: Arc<dyn ArtifactCache>,
    service: Arc<dyn GenerationService>,
    executor: Arc<RetryExecutor>,
    inflight: Mutex<HashMap<ArtifactId, Vec<oneshot::Sender<RenderResult>>>>,
}

/// Clears the in-flight entry if the leading request is dropped before finishing.
struct InflightGuard<'a> {
    renderer: &'a VisualRenderer,
    artifact_id: &'a ArtifactId,
    finished: bool,
}

impl InflightGuard<'_> {
    fn finish(mut self, result: &RenderResult) {
        self.finished = true;
        let waiters = self
            .renderer
            .inflight
            .lock()
            .remove(self.artifact_id)
            .unwrap_or_default();
        if !waiters.is_empty() {
            debug!(artifact_id = %self.artifact_id, waiters = waiters.len(), "Sharing render result");
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Dropping the senders wakes waiters with a closed channel.
            self.renderer.inflight.lock().remove(self.artifact_id);
        }
    }
}

impl VisualRenderer {
    pub fn new(
        cache: Arc<dyn ArtifactCache>,
        service: Arc<dyn GenerationService>,
        executor: Arc<RetryExecutor>,
    ) -> Self {
        Self {
            cache,
            service,
            executor,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of artifacts with a render currently in progress
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Render one artifact and persist the visual, joining an in-flight request if any.
    pub async fn render(
        &self,
        artifact_id: &ArtifactId,
        cancel: &CancellationToken,
    ) -> RenderResult {
        let waiter = {
            let mut inflight = self.inflight.lock();
            match inflight.get_mut(artifact_id) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    inflight.insert(artifact_id.clone(), Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            debug!(artifact_id = %artifact_id, "Joining in-flight render");
            return tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ApiError::Cancelled),
                shared = rx => shared.unwrap_or(Err(ApiError::Cancelled)),
            };
        }

        let guard = InflightGuard {
            renderer: self,
            artifact_id,
            finished: false,
        };
        let result = self.render_and_persist(artifact_id, cancel).await;
        guard.finish(&result);
        result
    }

    /// Render every artifact of the project that has a diagram but no visual yet.
    pub async fn render_project(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<RenderReport, ApiError> {
        let pending: Vec<ArtifactId> = self
            .cache
            .list_by_project(project_id)?
            .into_iter()
            .filter(|a| a.visual.is_none() && a.diagram_source.is_some())
            .map(|a| a.artifact_id)
            .collect();

        if pending.is_empty() {
            debug!(project_id = %project_id, "No artifacts awaiting a visual");
            return Ok(RenderReport::default());
        }

        let results = join_all(pending.iter().map(|id| self.render(id, cancel))).await;

        let mut report = RenderReport::default();
        for (artifact_id, result) in pending.into_iter().zip(results) {
            match result {
                Ok(_) => report.rendered.push(artifact_id),
                Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
                Err(error) => {
                    warn!(artifact_id = %artifact_id, error = %error, "Render failed");
                    report.failed.push((artifact_id, error));
                }
            }
        }
        info!(
            project_id = %project_id,
            rendered = report.rendered.len(),
            failed = report.failed.len(),
            "Rendered project visuals"
        );
        Ok(report)
    }

    async fn render_and_persist(
        &self,
        artifact_id: &ArtifactId,
        cancel: &CancellationToken,
    ) -> RenderResult {
        let artifact = self
            .cache
            .get(artifact_id)?
            .ok_or_else(|| StorageError::ArtifactNotFound(artifact_id.clone()))?;
        if artifact.diagram_source.is_none() {
            return Err(ApiError::Validation(format!(
                "Artifact {} has no diagram source to render",
                artifact_id
            )));
        }

        let service = &self.service;
        let target = &artifact;
        let outcome = self
            .executor
            .execute("render_visual", cancel, move |_| service.render_visual(target))
            .await?;

        // The record may have changed during the remote call.
        let mut latest = self.cache.get(artifact_id)?.unwrap_or(artifact);
        latest.visual = Some(outcome.value.clone());
        self.cache.update(&latest)?;
        debug!(artifact_id = %artifact_id, attempts = outcome.attempts, "Persisted visual");
        Ok(outcome.value)
    }
}
