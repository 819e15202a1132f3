//! Core data model: artifacts, identifiers and generation inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identity of an artifact within the cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh random identity for a locally created artifact
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Project grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Where an artifact's current content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Local,
    RemoteSynced,
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Local
    }
}

/// Secondary visual rendering of an artifact (e.g. a diagram image)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedVisual {
    pub format: String,
    pub content: String,
    pub rendered_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

/// One generated unit (a page wireframe) belonging to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub project_id: ProjectId,
    pub page_name: String,
    /// Rendered page markup
    pub markup: String,
    /// Diagram source (mermaid) used for the secondary rendering
    #[serde(default)]
    pub diagram_source: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub visual: Option<RenderedVisual>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub origin: Origin,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Artifact content handed to `ArtifactCache::create`
///
/// `artifact_id` is only set when adopting an identity assigned elsewhere
/// (the remote store); otherwise the cache assigns a fresh one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewArtifact {
    pub artifact_id: Option<ArtifactId>,
    pub page_name: String,
    pub markup: String,
    pub diagram_source: Option<String>,
    pub metadata: serde_json::Value,
    pub version: Option<u32>,
    pub origin: Origin,
    pub generated_at: Option<DateTime<Utc>>,
    /// Last modification time assigned elsewhere; defaults to now
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewArtifact {
    pub fn new(page_name: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            page_name: page_name.into(),
            markup: markup.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, artifact_id: ArtifactId) -> Self {
        self.artifact_id = Some(artifact_id);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_diagram(mut self, source: impl Into<String>) -> Self {
        self.diagram_source = Some(source.into());
        self
    }
}

impl From<&Artifact> for NewArtifact {
    fn from(artifact: &Artifact) -> Self {
        Self {
            artifact_id: Some(artifact.artifact_id.clone()),
            page_name: artifact.page_name.clone(),
            markup: artifact.markup.clone(),
            diagram_source: artifact.diagram_source.clone(),
            metadata: artifact.metadata.clone(),
            version: Some(artifact.version),
            origin: artifact.origin,
            generated_at: Some(artifact.generated_at),
            updated_at: Some(artifact.updated_at),
        }
    }
}

/// Count and freshness of one side's artifact collection for a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CollectionSummary {
    pub fn from_artifacts<'a>(artifacts: impl IntoIterator<Item = &'a Artifact>) -> Self {
        artifacts
            .into_iter()
            .fold(Self::default(), |mut summary, artifact| {
                summary.count += 1;
                summary.last_updated = summary.last_updated.max(Some(artifact.updated_at));
                summary
            })
    }
}

/// A user story feeding the generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStory {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

/// Everything the remote generation call needs for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInput {
    pub project_id: ProjectId,
    pub project_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_stories: Vec<UserStory>,
    /// Prior structured inputs (requirements, personas, ...) passed through verbatim
    #[serde(default)]
    pub structured_inputs: serde_json::Map<String, serde_json::Value>,
}
