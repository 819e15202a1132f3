//! Remote Store and Generation Service
//!
//! Interfaces to the authoritative remote artifact store and to the inference
//! service that generates artifacts. Two HTTP implementations are provided: an
//! authenticated client that talks to the project API, and an unauthenticated
//! client for a locally reachable generation endpoint.

use crate::error::ApiError;
use crate::types::{
    Artifact, ArtifactId, CollectionSummary, GenerationInput, NewArtifact, Origin, ProjectId,
    RenderedVisual,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Remote endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the authenticated project API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the unauthenticated generation endpoint
    #[serde(default = "default_local_generation_url")]
    pub local_generation_url: String,

    /// Bearer token; absent means the caller is unauthenticated
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_local_generation_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            local_generation_url: default_local_generation_url(),
            token: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, url) in [
            ("base_url", &self.base_url),
            ("local_generation_url", &self.local_generation_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{} must be an http(s) URL, got '{}'", name, url));
            }
        }
        if matches!(&self.token, Some(token) if token.trim().is_empty()) {
            return Err("token must not be blank".to_string());
        }
        Ok(())
    }
}

/// Artifact as exchanged with the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteArtifact {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub page_name: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub mermaid_code: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteArtifact {
    /// Convert to a cache draft, keeping the remote-assigned id when present
    pub fn into_new_artifact(self, origin: Origin) -> NewArtifact {
        NewArtifact {
            artifact_id: self.id.map(ArtifactId::new),
            page_name: self.page_name,
            markup: self.html_content,
            diagram_source: self.mermaid_code,
            metadata: self.metadata,
            version: self.version,
            origin,
            generated_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Reject a payload that names the same artifact id twice.
pub fn ensure_unique_ids(artifacts: &[RemoteArtifact]) -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    for id in artifacts.iter().filter_map(|a| a.id.as_deref()) {
        if !seen.insert(id) {
            return Err(ApiError::MalformedResponse(format!(
                "Artifact id {} appears more than once in the payload",
                id
            )));
        }
    }
    Ok(())
}

impl From<&Artifact> for RemoteArtifact {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: Some(artifact.artifact_id.to_string()),
            page_name: artifact.page_name.clone(),
            html_content: artifact.markup.clone(),
            mermaid_code: artifact.diagram_source.clone(),
            metadata: artifact.metadata.clone(),
            version: Some(artifact.version),
            created_at: Some(artifact.generated_at),
            updated_at: Some(artifact.updated_at),
        }
    }
}

/// Cheap existence check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteExistence {
    pub exists: bool,
    #[serde(rename = "wireframe_count", default)]
    pub count: usize,
}

/// Response of a generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default)]
    pub wireframes: Vec<RemoteArtifact>,
    #[serde(default)]
    pub message: Option<String>,
}

impl GenerationResponse {
    /// Artifacts of a successful response; an unsuccessful one becomes an error.
    pub fn into_artifacts(self) -> Result<Vec<RemoteArtifact>, ApiError> {
        if self.success {
            return Ok(self.wireframes);
        }
        let message = self
            .message
            .unwrap_or_else(|| "generation reported failure without a message".to_string());
        if ApiError::is_throttling_message(&message) {
            Err(ApiError::RateLimited(message))
        } else {
            Err(ApiError::GenerationRejected(message))
        }
    }
}

/// Authoritative remote artifact store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether any artifacts exist for the project (count only)
    async fn check_artifacts(&self, project_id: &ProjectId) -> Result<RemoteExistence, ApiError>;

    /// Full remote collection for the project
    async fn fetch_artifacts(&self, project_id: &ProjectId)
        -> Result<Vec<RemoteArtifact>, ApiError>;

    /// Bulk-send the full local collection. Returns the number accepted.
    async fn push_artifacts(
        &self,
        project_id: &ProjectId,
        artifacts: &[Artifact],
    ) -> Result<usize, ApiError>;

    /// Send the local snapshot for a two-way merge; returns the authoritative result.
    async fn merge_artifacts(
        &self,
        project_id: &ProjectId,
        artifacts: &[Artifact],
    ) -> Result<Vec<RemoteArtifact>, ApiError>;

    /// Remote count and freshness for the project
    async fn remote_summary(&self, project_id: &ProjectId)
        -> Result<CollectionSummary, ApiError>;
}

/// Remote inference service
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, input: &GenerationInput) -> Result<GenerationResponse, ApiError>;

    /// Produce the secondary visual rendering of one artifact
    async fn render_visual(&self, artifact: &Artifact) -> Result<RenderedVisual, ApiError>;
}

/// Map a non-success HTTP status to an error
pub fn map_status(status: u16, body: String) -> ApiError {
    match status {
        429 => ApiError::RateLimited(body),
        408 | 504 => ApiError::Timeout(body),
        413 => ApiError::PayloadTooLarge(body),
        400 | 422 => ApiError::Validation(body),
        401 | 403 => ApiError::Unauthorized(body),
        404 => ApiError::NotFound(body),
        _ => ApiError::RemoteFailure {
            status,
            message: body,
        },
    }
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        ApiError::Timeout(error.to_string())
    } else if error.is_connect() {
        ApiError::Network(format!("Connection error: {}", error))
    } else {
        ApiError::Network(format!("HTTP error: {}", error))
    }
}

fn build_http_client(config: &RemoteConfig) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = request.send().await.map_err(map_http_error)?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(map_status(status.as_u16(), body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::MalformedResponse(format!("Failed to parse response: {}", e)))
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    project_id: &'a ProjectId,
    project_name: &'a str,
    description: &'a str,
    user_stories: &'a [crate::types::UserStory],
    #[serde(flatten)]
    structured_inputs: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> From<&'a GenerationInput> for GenerateRequest<'a> {
    fn from(input: &'a GenerationInput) -> Self {
        Self {
            project_id: &input.project_id,
            project_name: &input.project_name,
            description: &input.description,
            user_stories: &input.user_stories,
            structured_inputs: &input.structured_inputs,
        }
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    wireframe_id: &'a ArtifactId,
    mermaid_code: &'a str,
}

#[derive(Deserialize)]
struct RenderResponse {
    #[serde(default = "default_render_format")]
    format: String,
    content: String,
}

fn default_render_format() -> String {
    "svg".to_string()
}

impl RenderResponse {
    fn into_visual(self) -> RenderedVisual {
        RenderedVisual {
            format: self.format,
            content: self.content,
            rendered_at: Utc::now(),
        }
    }
}

fn render_request(artifact: &Artifact) -> Result<RenderRequest<'_>, ApiError> {
    let source = artifact.diagram_source.as_deref().ok_or_else(|| {
        ApiError::Validation(format!(
            "Artifact {} has no diagram source to render",
            artifact.artifact_id
        ))
    })?;
    Ok(RenderRequest {
        wireframe_id: &artifact.artifact_id,
        mermaid_code: source,
    })
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    wireframes: Vec<RemoteArtifact>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    project_id: &'a ProjectId,
    operation: &'static str,
    wireframes: Vec<RemoteArtifact>,
}

#[derive(Deserialize)]
struct PushResponse {
    #[serde(default)]
    synced_count: Option<usize>,
}

#[derive(Serialize)]
struct MergeRequest {
    wireframes: Vec<RemoteArtifact>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(alias = "wireframe_count", default)]
    count: usize,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Authenticated client for the project API
pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpRemoteClient {
    pub fn new(config: &RemoteConfig, token: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn project_url(&self, project_id: &ProjectId, suffix: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, project_id, suffix)
    }

    fn get(&self, url: String) -> RequestBuilder {
        self.client.get(url).bearer_auth(&self.token)
    }

    fn post(&self, url: String) -> RequestBuilder {
        self.client.post(url).bearer_auth(&self.token)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteClient {
    async fn check_artifacts(&self, project_id: &ProjectId) -> Result<RemoteExistence, ApiError> {
        send_json(self.get(self.project_url(project_id, "check-wireframes/"))).await
    }

    async fn fetch_artifacts(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<RemoteArtifact>, ApiError> {
        let response: FetchResponse =
            send_json(self.get(self.project_url(project_id, "wireframes-sync/"))).await?;
        Ok(response.wireframes)
    }

    async fn push_artifacts(
        &self,
        project_id: &ProjectId,
        artifacts: &[Artifact],
    ) -> Result<usize, ApiError> {
        let body = PushRequest {
            project_id,
            operation: "push",
            wireframes: artifacts.iter().map(RemoteArtifact::from).collect(),
        };
        let url = format!("{}/wireframes/bulk-sync/", self.base_url);
        let response: PushResponse = send_json(self.post(url).json(&body)).await?;
        Ok(response.synced_count.unwrap_or(artifacts.len()))
    }

    async fn merge_artifacts(
        &self,
        project_id: &ProjectId,
        artifacts: &[Artifact],
    ) -> Result<Vec<RemoteArtifact>, ApiError> {
        let body = MergeRequest {
            wireframes: artifacts.iter().map(RemoteArtifact::from).collect(),
        };
        let response: FetchResponse = send_json(
            self.post(self.project_url(project_id, "sync-wireframes/"))
                .json(&body),
        )
        .await?;
        Ok(response.wireframes)
    }

    async fn remote_summary(
        &self,
        project_id: &ProjectId,
    ) -> Result<CollectionSummary, ApiError> {
        let response: StatusResponse =
            send_json(self.get(self.project_url(project_id, "wireframe-sync-status/"))).await?;
        Ok(CollectionSummary {
            count: response.count,
            last_updated: response.last_updated,
        })
    }
}

#[async_trait]
impl GenerationService for HttpRemoteClient {
    async fn generate(&self, input: &GenerationInput) -> Result<GenerationResponse, ApiError> {
        debug!(project_id = %input.project_id, "Requesting authenticated generation");
        let body = GenerateRequest::from(input);
        send_json(
            self.post(self.project_url(&input.project_id, "generate"))
                .json(&body),
        )
        .await
    }

    async fn render_visual(&self, artifact: &Artifact) -> Result<RenderedVisual, ApiError> {
        let body = render_request(artifact)?;
        let url = format!(
            "{}/wireframes/{}/render-diagram/",
            self.base_url, artifact.artifact_id
        );
        let response: RenderResponse = send_json(self.post(url).json(&body)).await?;
        Ok(response.into_visual())
    }
}

/// Unauthenticated client for a locally reachable generation endpoint
pub struct LocalGenerationClient {
    client: Client,
    base_url: String,
}

impl LocalGenerationClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.local_generation_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GenerationService for LocalGenerationClient {
    async fn generate(&self, input: &GenerationInput) -> Result<GenerationResponse, ApiError> {
        debug!(project_id = %input.project_id, "Requesting local generation");
        let body = GenerateRequest::from(input);
        let url = format!("{}/generate-wireframes", self.base_url);
        send_json(self.client.post(url).json(&body)).await
    }

    async fn render_visual(&self, artifact: &Artifact) -> Result<RenderedVisual, ApiError> {
        let body = render_request(artifact)?;
        let url = format!("{}/render-diagram", self.base_url);
        let response: RenderResponse = send_json(self.client.post(url).json(&body)).await?;
        Ok(response.into_visual())
    }
}
