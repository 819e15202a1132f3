//! Integration tests for GenerationOrchestrator
//!
//! Tests cover:
//! - Returning cached work without remote calls
//! - Pulling remote work when authenticated
//! - Generating, persisting and auto-syncing when nothing exists
//! - Throttled generation retried with growing delays
//! - Stage-tagged failures without substitute content

use crate::integration::test_utils::{
    executor, generation_input, open_cache, open_limiter, remote_artifact, successful_generation,
    MockRemote,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiresync::cache::{ArtifactCache, SledArtifactCache};
use wiresync::error::{ApiError, Stage};
use wiresync::orchestrator::{ArtifactSource, Backends, GenerationOrchestrator};
use wiresync::remote::RemoteStore;
use wiresync::types::{NewArtifact, Origin, ProjectId};

fn orchestrator(
    cache: &Arc<SledArtifactCache>,
    remote: &Arc<MockRemote>,
    authenticated: bool,
) -> GenerationOrchestrator {
    let store = if authenticated {
        Some(remote.clone() as Arc<dyn RemoteStore>)
    } else {
        None
    };
    let backends = Backends {
        store,
        generator: remote.clone(),
    };
    GenerationOrchestrator::new(cache.clone(), backends, executor(open_limiter()))
}

#[tokio::test]
async fn test_unauthenticated_returns_cached_artifacts_without_remote_calls() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let project = ProjectId::from("P1");
    for page in ["Home", "Search", "Checkout"] {
        cache.create(&project, NewArtifact::new(page, "<div/>")).unwrap();
    }

    let outcome = orchestrator(&cache, &remote, false)
        .artifacts_for(&generation_input("P1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.source, ArtifactSource::LocalCache);
    assert_eq!(outcome.artifacts.len(), 3);
    assert!(!outcome.auto_synced);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn test_authenticated_generation_persists_and_pushes_once() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.script_generate(vec![Ok(successful_generation(&["g1", "g2", "g3", "g4"]))]);

    let outcome = orchestrator(&cache, &remote, true)
        .artifacts_for(&generation_input("P2"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.source, ArtifactSource::Generated);
    assert!(outcome.auto_synced);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.artifacts.len(), 4);
    assert_eq!(cache.list_by_project(&ProjectId::from("P2")).unwrap().len(), 4);
    assert!(outcome.artifacts.iter().all(|a| a.origin == Origin::Local));
    assert_eq!(MockRemote::count(&remote.generate_calls), 1);
    assert_eq!(MockRemote::count(&remote.push_calls), 1);
    assert_eq!(remote.remote_artifacts("P2").len(), 4);
}

#[tokio::test]
async fn test_authenticated_prefers_remote_collection() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.seed("P3", vec![remote_artifact("r1", "Home"), remote_artifact("r2", "About")]);
    cache
        .create(&ProjectId::from("P3"), NewArtifact::new("Old", "<div/>"))
        .unwrap();

    let outcome = orchestrator(&cache, &remote, true)
        .artifacts_for(&generation_input("P3"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.source, ArtifactSource::Database);
    assert_eq!(outcome.artifacts.len(), 2);
    assert!(outcome.artifacts.iter().all(|a| a.origin == Origin::RemoteSynced));
    assert_eq!(MockRemote::count(&remote.generate_calls), 0);
}

#[tokio::test]
async fn test_authenticated_with_only_local_work_pushes_and_returns_cache() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    cache
        .create(&ProjectId::from("P4"), NewArtifact::new("Home", "<div/>"))
        .unwrap();

    let outcome = orchestrator(&cache, &remote, true)
        .artifacts_for(&generation_input("P4"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.source, ArtifactSource::LocalCache);
    assert_eq!(MockRemote::count(&remote.push_calls), 1);
    assert_eq!(MockRemote::count(&remote.generate_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_generation_retries_with_growing_delays() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.script_generate(vec![
        Err(ApiError::RateLimited("429 Too Many Requests".to_string())),
        Err(ApiError::RateLimited("429 Too Many Requests".to_string())),
        Ok(successful_generation(&["g1", "g2"])),
    ]);

    let outcome = orchestrator(&cache, &remote, false)
        .artifacts_for(&generation_input("P5"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.source, ArtifactSource::Generated);
    assert!(!outcome.auto_synced);
    assert_eq!(outcome.artifacts.len(), 2);

    let times = remote.generate_times();
    assert_eq!(times.len(), 3);
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_secs(4), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_secs(8), "second gap {:?}", second_gap);
    assert!(second_gap > first_gap);
}

#[tokio::test]
async fn test_fatal_generation_error_reports_stage_without_fallback() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.script_generate(vec![Err(ApiError::Validation("no user stories".to_string()))]);

    let error = orchestrator(&cache, &remote, false)
        .artifacts_for(&generation_input("P6"), &CancellationToken::new())
        .await
        .unwrap_err();

    match error {
        ApiError::StageFailed {
            stage,
            local_artifacts,
            ref source,
        } => {
            assert_eq!(stage, Stage::Generation);
            assert_eq!(local_artifacts, 0);
            assert!(matches!(**source, ApiError::Validation(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(MockRemote::count(&remote.generate_calls), 1);
    assert!(cache.list_by_project(&ProjectId::from("P6")).unwrap().is_empty());
}

#[tokio::test]
async fn test_generation_with_repeated_ids_persists_nothing() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.script_generate(vec![Ok(successful_generation(&["g1", "g2", "g1"]))]);

    let error = orchestrator(&cache, &remote, true)
        .artifacts_for(&generation_input("P8"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ApiError::StageFailed { stage: Stage::Generation, .. }
    ));
    assert!(matches!(error.root_cause(), ApiError::MalformedResponse(_)));
    assert!(cache.list_by_project(&ProjectId::from("P8")).unwrap().is_empty());
    assert_eq!(MockRemote::count(&remote.push_calls), 0);
}

#[tokio::test]
async fn test_rejected_generation_response_is_not_masked() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.script_generate(vec![Ok(wiresync::remote::GenerationResponse {
        success: false,
        wireframes: vec![],
        message: Some("model unavailable".to_string()),
    })]);

    let error = orchestrator(&cache, &remote, false)
        .artifacts_for(&generation_input("P7"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error.root_cause(), ApiError::GenerationRejected(_)));
    assert!(cache.list_by_project(&ProjectId::from("P7")).unwrap().is_empty());
}

#[tokio::test]
async fn test_push_failure_reports_sync_stage_and_keeps_local_work() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.script_generate(vec![Ok(successful_generation(&["g1", "g2", "g3", "g4"]))]);
    remote.fail_pushes_with(ApiError::PayloadTooLarge("too big".to_string()));

    let error = orchestrator(&cache, &remote, true)
        .artifacts_for(&generation_input("P8"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ApiError::StageFailed {
            stage: Stage::Sync,
            local_artifacts: 4,
            ..
        }
    ));
    assert_eq!(cache.list_by_project(&ProjectId::from("P8")).unwrap().len(), 4);
}

#[tokio::test]
async fn test_cancelled_round_surfaces_cancellation() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = orchestrator(&cache, &remote, false)
        .artifacts_for(&generation_input("P9"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(error, ApiError::Cancelled));
    assert_eq!(MockRemote::count(&remote.generate_calls), 0);
}

#[tokio::test]
async fn test_sync_requires_authentication() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let result = orchestrator(&cache, &remote, false)
        .status(&ProjectId::from("P1"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}
