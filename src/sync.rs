//! Sync Reconciler
//!
//! Brings the local cache and the remote store into agreement for one project
//! by replacing whole collections. A reconciliation ends in exactly one of
//! pulled, pushed, merged or nothing-to-sync; there is no partial merge.

use crate::cache::ArtifactCache;
use crate::error::ApiError;
use crate::remote::{ensure_unique_ids, RemoteArtifact, RemoteStore};
use crate::retry::cancellable;
use crate::types::{Artifact, CollectionSummary, Origin, ProjectId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which side is allowed to win a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Remote wins when it has anything; otherwise local is pushed up
    PullPreferring,
    /// Skip the remote check and push the local collection if non-empty
    PushLocal,
    /// Send the local snapshot to the merge endpoint and adopt its result
    TwoWay,
}

/// Steps of the reconciliation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    CheckRemoteExistence,
    PullReplaceLocal,
    CheckLocalExistence,
    PushLocalToRemote,
    MergeTwoWay,
    Done,
}

impl ReconcileState {
    fn entry(mode: ReconcileMode) -> Self {
        match mode {
            ReconcileMode::PullPreferring => ReconcileState::CheckRemoteExistence,
            ReconcileMode::PushLocal => ReconcileState::CheckLocalExistence,
            ReconcileMode::TwoWay => ReconcileState::MergeTwoWay,
        }
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileState::CheckRemoteExistence => "check_remote_existence",
            ReconcileState::PullReplaceLocal => "pull_replace_local",
            ReconcileState::CheckLocalExistence => "check_local_existence",
            ReconcileState::PushLocalToRemote => "push_local_to_remote",
            ReconcileState::MergeTwoWay => "merge_two_way",
            ReconcileState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local collection replaced by the remote one
    Pulled { count: usize },
    /// Local collection sent to the remote bulk endpoint
    Pushed { count: usize },
    /// Local collection replaced by the remote merge result
    Merged { count: usize },
    NothingToSync,
}

impl ReconcileOutcome {
    pub fn count(&self) -> usize {
        match self {
            ReconcileOutcome::Pulled { count }
            | ReconcileOutcome::Pushed { count }
            | ReconcileOutcome::Merged { count } => *count,
            ReconcileOutcome::NothingToSync => 0,
        }
    }
}

/// Derived comparison of local and remote collections; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub local: CollectionSummary,
    pub remote: CollectionSummary,
    pub is_synced: bool,
    pub needs_sync: bool,
}

impl SyncStatus {
    pub fn compare(local: CollectionSummary, remote: CollectionSummary) -> Self {
        let local_newer = match (local.last_updated, remote.last_updated) {
            (Some(l), Some(r)) => l > r,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let is_synced = local.count == remote.count && !local_newer;
        Self {
            local,
            remote,
            is_synced,
            needs_sync: !is_synced,
        }
    }
}

/// Per-project reconciliation between the cache and the remote store
pub struct SyncReconciler {
    cache: Arc<dyn ArtifactCache>,
    remote: Arc<dyn RemoteStore>,
}

impl SyncReconciler {
    pub fn new(cache: Arc<dyn ArtifactCache>, remote: Arc<dyn RemoteStore>) -> Self {
        Self { cache, remote }
    }

    /// Run the state machine for `project_id` until it reaches `Done`.
    pub async fn reconcile(
        &self,
        project_id: &ProjectId,
        mode: ReconcileMode,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ApiError> {
        let mut state = ReconcileState::entry(mode);
        let mut outcome = ReconcileOutcome::NothingToSync;
        let mut local: Vec<Artifact> = Vec::new();

        while state != ReconcileState::Done {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            debug!(project_id = %project_id, state = %state, ?mode, "Reconciliation step");

            state = match state {
                ReconcileState::CheckRemoteExistence => {
                    let existence =
                        cancellable(cancel, self.remote.check_artifacts(project_id)).await?;
                    if existence.count > 0 {
                        ReconcileState::PullReplaceLocal
                    } else {
                        ReconcileState::CheckLocalExistence
                    }
                }
                ReconcileState::PullReplaceLocal => {
                    let fetched =
                        cancellable(cancel, self.remote.fetch_artifacts(project_id)).await?;
                    if fetched.is_empty() {
                        warn!(
                            project_id = %project_id,
                            "Remote reported artifacts but returned none; keeping local copy"
                        );
                        ReconcileState::CheckLocalExistence
                    } else {
                        let count = self.replace_local(project_id, fetched)?;
                        outcome = ReconcileOutcome::Pulled { count };
                        ReconcileState::Done
                    }
                }
                ReconcileState::CheckLocalExistence => {
                    local = self.cache.list_by_project(project_id)?;
                    if local.is_empty() {
                        ReconcileState::Done
                    } else {
                        ReconcileState::PushLocalToRemote
                    }
                }
                ReconcileState::PushLocalToRemote => {
                    let count =
                        cancellable(cancel, self.remote.push_artifacts(project_id, &local))
                            .await?;
                    outcome = ReconcileOutcome::Pushed { count };
                    ReconcileState::Done
                }
                ReconcileState::MergeTwoWay => {
                    local = self.cache.list_by_project(project_id)?;
                    let merged =
                        cancellable(cancel, self.remote.merge_artifacts(project_id, &local))
                            .await?;
                    let count = self.replace_local(project_id, merged)?;
                    outcome = ReconcileOutcome::Merged { count };
                    ReconcileState::Done
                }
                ReconcileState::Done => ReconcileState::Done,
            };
        }

        info!(project_id = %project_id, ?mode, ?outcome, "Reconciliation finished");
        Ok(outcome)
    }

    /// Compare local and remote collections for `project_id`.
    pub async fn status(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> Result<SyncStatus, ApiError> {
        let local = self.cache.summary(project_id)?;
        let remote = cancellable(cancel, self.remote.remote_summary(project_id)).await?;
        Ok(SyncStatus::compare(local, remote))
    }

    fn replace_local(
        &self,
        project_id: &ProjectId,
        incoming: Vec<RemoteArtifact>,
    ) -> Result<usize, ApiError> {
        ensure_unique_ids(&incoming)?;
        let drafts = incoming
            .into_iter()
            .map(|artifact| artifact.into_new_artifact(Origin::RemoteSynced))
            .collect();
        let stored = self.cache.replace_project(project_id, drafts)?;
        debug!(project_id = %project_id, stored = stored.len(), "Replaced local collection");
        Ok(stored.len())
    }
}
