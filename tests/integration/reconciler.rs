//! Integration tests for SyncReconciler
//!
//! Tests cover:
//! - Pull replacing the local collection
//! - Rejected pulls leaving the local collection intact
//! - Push of local-only collections
//! - Two-way merge adoption
//! - Status after reconciliation
//! - Cancellation

use crate::integration::test_utils::{open_cache, remote_artifact, MockRemote};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiresync::cache::ArtifactCache;
use wiresync::error::{ApiError, StorageError};
use wiresync::sync::{ReconcileMode, ReconcileOutcome, SyncReconciler};
use wiresync::types::{ArtifactId, NewArtifact, Origin, ProjectId};

fn seed_local(cache: &dyn ArtifactCache, project: &str, ids: &[&str]) {
    for id in ids {
        cache
            .create(
                &ProjectId::from(project),
                NewArtifact::new(format!("Local {}", id), "<div/>").with_id(ArtifactId::from(*id)),
            )
            .unwrap();
    }
}

#[tokio::test]
async fn test_pull_replaces_local_collection() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.seed(
        "p1",
        vec![
            remote_artifact("r1", "Home"),
            remote_artifact("r2", "Search"),
            remote_artifact("r3", "Checkout"),
        ],
    );
    seed_local(cache.as_ref(), "p1", &["stale-1", "stale-2"]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let outcome = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Pulled { count: 3 });
    let local = cache.list_by_project(&ProjectId::from("p1")).unwrap();
    assert_eq!(local.len(), 3);
    assert!(local.iter().all(|a| a.origin == Origin::RemoteSynced));
    let mut ids: Vec<&str> = local.iter().map(|a| a.artifact_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
    assert!(cache.get(&ArtifactId::from("stale-1")).unwrap().is_none());
    assert_eq!(MockRemote::count(&remote.push_calls), 0);
}

#[tokio::test]
async fn test_pull_leaves_other_projects_alone() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.seed("p1", vec![remote_artifact("r1", "Home")]);
    seed_local(cache.as_ref(), "p2", &["keep-me"]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cache.list_by_project(&ProjectId::from("p2")).unwrap().len(), 1);
}

#[tokio::test]
async fn test_pull_conflicting_with_other_project_keeps_local_collection() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    seed_local(cache.as_ref(), "p1", &["keep1"]);
    seed_local(cache.as_ref(), "p2", &["shared"]);
    remote.seed("p1", vec![remote_artifact("r1", "Home"), remote_artifact("shared", "Shared")]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let result = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ApiError::Storage(StorageError::DuplicateArtifact { .. }))
    ));
    let local = cache.list_by_project(&ProjectId::from("p1")).unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].artifact_id.as_str(), "keep1");
    assert!(cache.get(&ArtifactId::from("r1")).unwrap().is_none());
    assert_eq!(cache.list_by_project(&ProjectId::from("p2")).unwrap().len(), 1);
}

#[tokio::test]
async fn test_pull_with_repeated_ids_is_rejected_without_writes() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    seed_local(cache.as_ref(), "p1", &["keep1", "keep2"]);
    remote.seed("p1", vec![remote_artifact("r1", "Home"), remote_artifact("r1", "Home again")]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let result = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
    let mut ids: Vec<String> = cache
        .list_by_project(&ProjectId::from("p1"))
        .unwrap()
        .iter()
        .map(|a| a.artifact_id.to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["keep1", "keep2"]);
    assert!(cache.get(&ArtifactId::from("r1")).unwrap().is_none());
}

#[tokio::test]
async fn test_merge_with_repeated_ids_is_rejected() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    seed_local(cache.as_ref(), "p1", &["a"]);
    remote.set_merge_result(vec![remote_artifact("m1", "One"), remote_artifact("m1", "Two")]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let result = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::TwoWay, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
    let local = cache.list_by_project(&ProjectId::from("p1")).unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].artifact_id.as_str(), "a");
}

#[tokio::test]
async fn test_empty_remote_receives_local_collection() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    seed_local(cache.as_ref(), "p1", &["a", "b"]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let outcome = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Pushed { count: 2 });
    assert_eq!(MockRemote::count(&remote.push_calls), 1);
    assert_eq!(remote.remote_artifacts("p1").len(), 2);
    assert_eq!(MockRemote::count(&remote.fetch_calls), 0);
}

#[tokio::test]
async fn test_nothing_anywhere_is_nothing_to_sync() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let outcome = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::NothingToSync);
    assert_eq!(MockRemote::count(&remote.check_calls), 1);
    assert_eq!(MockRemote::count(&remote.push_calls), 0);
}

#[tokio::test]
async fn test_push_mode_skips_remote_check() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.seed("p1", vec![remote_artifact("r1", "Home")]);
    seed_local(cache.as_ref(), "p1", &["a"]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let outcome = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PushLocal, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Pushed { count: 1 });
    assert_eq!(MockRemote::count(&remote.check_calls), 0);
    assert_eq!(remote.remote_artifacts("p1")[0].id.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_two_way_adopts_remote_merge_result() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    seed_local(cache.as_ref(), "p1", &["a", "b"]);
    remote.set_merge_result(vec![remote_artifact("merged", "Merged page")]);

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let outcome = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::TwoWay, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Merged { count: 1 });
    let local = cache.list_by_project(&ProjectId::from("p1")).unwrap();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].artifact_id.as_str(), "merged");
    assert_eq!(local[0].origin, Origin::RemoteSynced);
    assert_eq!(MockRemote::count(&remote.merge_calls), 1);
}

#[tokio::test]
async fn test_status_after_pull_is_synced() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.seed("p1", vec![remote_artifact("r1", "Home"), remote_artifact("r2", "About")]);
    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let cancel = CancellationToken::new();
    let project = ProjectId::from("p1");

    let before = reconciler.status(&project, &cancel).await.unwrap();
    assert!(before.needs_sync);
    assert_eq!(before.local.count, 0);
    assert_eq!(before.remote.count, 2);

    reconciler
        .reconcile(&project, ReconcileMode::PullPreferring, &cancel)
        .await
        .unwrap();

    let after = reconciler.status(&project, &cancel).await.unwrap();
    assert!(after.is_synced);
    assert_eq!(after.local.count, 2);
}

#[tokio::test]
async fn test_cancelled_reconciliation_makes_no_calls() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.seed("p1", vec![remote_artifact("r1", "Home")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let reconciler = SyncReconciler::new(cache.clone(), remote.clone());
    let result = reconciler
        .reconcile(&ProjectId::from("p1"), ReconcileMode::PullPreferring, &cancel)
        .await;

    assert!(matches!(result, Err(ApiError::Cancelled)));
    assert_eq!(remote.total_calls(), 0);
    assert!(cache.list_by_project(&ProjectId::from("p1")).unwrap().is_empty());
}

#[tokio::test]
async fn test_reconciler_accepts_shared_trait_objects() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let cache: Arc<dyn ArtifactCache> = cache;
    let reconciler = SyncReconciler::new(cache, remote);
    let outcome = reconciler
        .reconcile(&ProjectId::from("empty"), ReconcileMode::PushLocal, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::NothingToSync);
}
