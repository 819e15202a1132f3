//! Integration tests for the single-flight visual renderer
//!
//! Tests cover:
//! - Concurrent requests for one artifact sharing a single remote call
//! - Persisting the rendered visual
//! - Rendering every pending artifact of a project

use crate::integration::test_utils::{executor, open_cache, open_limiter, MockRemote};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiresync::cache::ArtifactCache;
use wiresync::error::{ApiError, StorageError};
use wiresync::render::VisualRenderer;
use wiresync::types::{ArtifactId, NewArtifact, ProjectId};

#[tokio::test(start_paused = true)]
async fn test_concurrent_renders_share_one_remote_call() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    remote.set_render_delay(Duration::from_secs(2));
    let artifact = cache
        .create(
            &ProjectId::from("p1"),
            NewArtifact::new("Home", "<div/>").with_diagram("graph TD; A-->B"),
        )
        .unwrap();

    let renderer = VisualRenderer::new(cache.clone(), remote.clone(), executor(open_limiter()));
    let cancel = CancellationToken::new();
    let (first, second) = tokio::join!(
        renderer.render(&artifact.artifact_id, &cancel),
        renderer.render(&artifact.artifact_id, &cancel)
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first, second);
    assert_eq!(MockRemote::count(&remote.render_calls), 1);
    assert_eq!(renderer.in_flight(), 0);

    let stored = cache.get(&artifact.artifact_id).unwrap().unwrap();
    assert_eq!(stored.visual, Some(first));
    assert!(stored.version > artifact.version);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_renders_each_call_remote() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let artifact = cache
        .create(
            &ProjectId::from("p1"),
            NewArtifact::new("Home", "<div/>").with_diagram("graph TD; A-->B"),
        )
        .unwrap();

    let renderer = VisualRenderer::new(cache.clone(), remote.clone(), executor(open_limiter()));
    let cancel = CancellationToken::new();
    renderer.render(&artifact.artifact_id, &cancel).await.unwrap();
    renderer.render(&artifact.artifact_id, &cancel).await.unwrap();

    assert_eq!(MockRemote::count(&remote.render_calls), 2);
}

#[tokio::test(start_paused = true)]
async fn test_render_project_skips_rendered_and_diagramless_artifacts() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let project = ProjectId::from("p1");
    let a = cache
        .create(&project, NewArtifact::new("A", "<div/>").with_diagram("graph TD; A"))
        .unwrap();
    let b = cache
        .create(&project, NewArtifact::new("B", "<div/>").with_diagram("graph TD; B"))
        .unwrap();
    cache.create(&project, NewArtifact::new("C", "<div/>")).unwrap();

    let renderer = VisualRenderer::new(cache.clone(), remote.clone(), executor(open_limiter()));
    let cancel = CancellationToken::new();
    let report = renderer.render_project(&project, &cancel).await.unwrap();

    assert!(report.is_clean());
    let mut rendered = report.rendered.clone();
    rendered.sort();
    let mut expected = vec![a.artifact_id.clone(), b.artifact_id.clone()];
    expected.sort();
    assert_eq!(rendered, expected);
    assert_eq!(MockRemote::count(&remote.render_calls), 2);

    let again = renderer.render_project(&project, &cancel).await.unwrap();
    assert!(again.rendered.is_empty());
    assert_eq!(MockRemote::count(&remote.render_calls), 2);
}

#[tokio::test]
async fn test_render_unknown_artifact_is_not_found() {
    let (cache, _temp_dir) = open_cache();
    let remote = MockRemote::new();
    let renderer = VisualRenderer::new(cache.clone(), remote.clone(), executor(open_limiter()));

    let result = renderer
        .render(&ArtifactId::from("missing"), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ApiError::Storage(StorageError::ArtifactNotFound(_)))
    ));
    assert_eq!(MockRemote::count(&remote.render_calls), 0);
    assert_eq!(renderer.in_flight(), 0);
}
