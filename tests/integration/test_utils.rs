//! Shared test utilities for integration tests
//!
//! `MockRemote` is an in-memory stand-in for both the remote project store and
//! the generation service, with scripted generation results and call counters.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use wiresync::cache::SledArtifactCache;
use wiresync::error::ApiError;
use wiresync::limiter::{RateLimitConfig, RateLimiter};
use wiresync::remote::{GenerationResponse, GenerationService, RemoteArtifact, RemoteExistence, RemoteStore};
use wiresync::retry::{RetryExecutor, RetryPolicy};
use wiresync::types::{Artifact, CollectionSummary, GenerationInput, ProjectId, RenderedVisual, UserStory};

#[derive(Default)]
struct MockState {
    remote: HashMap<ProjectId, Vec<RemoteArtifact>>,
    generate_script: VecDeque<Result<GenerationResponse, ApiError>>,
    generate_times: Vec<Instant>,
    merge_result: Option<Vec<RemoteArtifact>>,
    push_failure: Option<ApiError>,
    render_delay: Duration,
}

/// In-memory remote store and generation service
#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
    pub check_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
    pub merge_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub render_calls: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, project: &str, artifacts: Vec<RemoteArtifact>) {
        self.state
            .lock()
            .remote
            .insert(ProjectId::from(project), artifacts);
    }

    pub fn remote_artifacts(&self, project: &str) -> Vec<RemoteArtifact> {
        self.state
            .lock()
            .remote
            .get(&ProjectId::from(project))
            .cloned()
            .unwrap_or_default()
    }

    /// Queue generation results, consumed one per call
    pub fn script_generate(&self, results: Vec<Result<GenerationResponse, ApiError>>) {
        self.state.lock().generate_script.extend(results);
    }

    pub fn set_merge_result(&self, artifacts: Vec<RemoteArtifact>) {
        self.state.lock().merge_result = Some(artifacts);
    }

    pub fn fail_pushes_with(&self, error: ApiError) {
        self.state.lock().push_failure = Some(error);
    }

    pub fn set_render_delay(&self, delay: Duration) {
        self.state.lock().render_delay = delay;
    }

    pub fn generate_times(&self) -> Vec<Instant> {
        self.state.lock().generate_times.clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        [
            &self.check_calls,
            &self.fetch_calls,
            &self.push_calls,
            &self.merge_calls,
            &self.generate_calls,
            &self.render_calls,
        ]
        .iter()
        .map(|counter| Self::count(counter))
        .sum()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn check_artifacts(&self, project_id: &ProjectId) -> Result<RemoteExistence, ApiError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        let count = self
            .state
            .lock()
            .remote
            .get(project_id)
            .map(Vec::len)
            .unwrap_or(0);
        Ok(RemoteExistence {
            exists: count > 0,
            count,
        })
    }

    async fn fetch_artifacts(&self, project_id: &ProjectId) -> Result<Vec<RemoteArtifact>, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .remote
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_artifacts(&self, project_id: &ProjectId, artifacts: &[Artifact]) -> Result<usize, ApiError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(error) = state.push_failure.clone() {
            return Err(error);
        }
        state.remote.insert(
            project_id.clone(),
            artifacts.iter().map(RemoteArtifact::from).collect(),
        );
        Ok(artifacts.len())
    }

    async fn merge_artifacts(&self, project_id: &ProjectId, artifacts: &[Artifact]) -> Result<Vec<RemoteArtifact>, ApiError> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let merged = match state.merge_result.clone() {
            Some(result) => result,
            None => {
                let mut merged: Vec<RemoteArtifact> =
                    artifacts.iter().map(RemoteArtifact::from).collect();
                for remote in state.remote.get(project_id).cloned().unwrap_or_default() {
                    merged.retain(|local| local.id != remote.id);
                    merged.push(remote);
                }
                merged
            }
        };
        state.remote.insert(project_id.clone(), merged.clone());
        Ok(merged)
    }

    async fn remote_summary(&self, project_id: &ProjectId) -> Result<CollectionSummary, ApiError> {
        let state = self.state.lock();
        let artifacts = state.remote.get(project_id).cloned().unwrap_or_default();
        Ok(CollectionSummary {
            count: artifacts.len(),
            last_updated: artifacts.iter().filter_map(|a| a.updated_at).max(),
        })
    }
}

#[async_trait]
impl GenerationService for MockRemote {
    async fn generate(&self, _input: &GenerationInput) -> Result<GenerationResponse, ApiError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.generate_times.push(Instant::now());
        state
            .generate_script
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::GenerationRejected("no scripted response".to_string())))
    }

    async fn render_visual(&self, artifact: &Artifact) -> Result<RenderedVisual, ApiError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().render_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(RenderedVisual {
            format: "svg".to_string(),
            content: format!("<svg id=\"{}\"/>", artifact.artifact_id),
            rendered_at: Utc::now(),
        })
    }
}

pub fn fixed_time(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn remote_artifact(id: &str, page: &str) -> RemoteArtifact {
    RemoteArtifact {
        id: Some(id.to_string()),
        page_name: page.to_string(),
        html_content: format!("<main>{}</main>", page),
        mermaid_code: Some(format!("graph TD; {}", page)),
        metadata: serde_json::json!({ "source": "remote" }),
        version: Some(1),
        created_at: Some(fixed_time(0)),
        updated_at: Some(fixed_time(60)),
    }
}

pub fn successful_generation(ids: &[&str]) -> GenerationResponse {
    GenerationResponse {
        success: true,
        wireframes: ids.iter().map(|id| remote_artifact(id, &format!("Page {}", id))).collect(),
        message: None,
    }
}

pub fn generation_input(project: &str) -> GenerationInput {
    GenerationInput {
        project_id: ProjectId::from(project),
        project_name: format!("Project {}", project),
        description: "Room booking for small hotels".to_string(),
        user_stories: vec![UserStory {
            title: "Book a room".to_string(),
            description: "As a guest I want to book a room".to_string(),
            acceptance_criteria: vec!["Shows availability".to_string()],
        }],
        structured_inputs: serde_json::Map::new(),
    }
}

pub fn open_cache() -> (Arc<SledArtifactCache>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let cache = SledArtifactCache::new(temp_dir.path().join("cache")).unwrap();
    (Arc::new(cache), temp_dir)
}

/// Limiter that never holds a call, so delays observed come from retry backoff only
pub fn open_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimitConfig {
        max_per_window: 1000,
        window_secs: 60,
        min_inter_call_ms: 0,
        burst_limit: 1000,
        burst_window_secs: 5,
        safety_margin_ms: 0,
    }))
}

pub fn executor(limiter: Arc<RateLimiter>) -> Arc<RetryExecutor> {
    Arc::new(RetryExecutor::new(limiter, RetryPolicy::default()))
}
