//! Legacy storage partitions
//!
//! Earlier releases kept artifacts in several differently named partitions with
//! loosely shaped JSON records. The set of names is finite and known; nothing
//! here discovers partitions by matching on names at runtime.

use crate::error::ParseError;
use crate::types::{ArtifactId, NewArtifact, Origin, ProjectId};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Schema version written once legacy partitions have been consolidated
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Legacy partitions, in merge order. Later entries win on id collisions.
pub const LEGACY_PARTITIONS: &[&str] = &[
    "wireframes",
    "wireframes_v1",
    "project_wireframes",
    "local_wireframes",
];

/// Record shape accepted from legacy partitions
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyArtifact {
    #[serde(default, alias = "artifact_id", alias = "wireframe_id")]
    pub id: Option<String>,
    #[serde(alias = "projectId")]
    pub project_id: String,
    #[serde(default, alias = "pageName", alias = "title", alias = "name")]
    pub page_name: String,
    #[serde(default, alias = "htmlContent", alias = "html", alias = "markup")]
    pub html_content: String,
    #[serde(default, alias = "mermaidCode", alias = "diagram_source")]
    pub mermaid_code: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default, alias = "createdAt", alias = "generated_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LegacyArtifact {
    pub fn project_id(&self) -> ProjectId {
        ProjectId::new(self.project_id.clone())
    }

    pub fn into_new_artifact(self) -> NewArtifact {
        NewArtifact {
            artifact_id: Some(
                self.id
                    .map(ArtifactId::new)
                    .unwrap_or_else(ArtifactId::generate),
            ),
            page_name: self.page_name,
            markup: self.html_content,
            diagram_source: self.mermaid_code,
            metadata: self.metadata,
            version: self.version,
            origin: Origin::Local,
            generated_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyValue {
    Many(Vec<LegacyArtifact>),
    One(LegacyArtifact),
}

/// Parse one legacy value, which holds either a single record or an array.
pub fn parse_legacy_value(
    partition: &str,
    key: &[u8],
    value: &[u8],
) -> Result<Vec<LegacyArtifact>, ParseError> {
    match serde_json::from_slice::<LegacyValue>(value) {
        Ok(LegacyValue::Many(records)) => Ok(records),
        Ok(LegacyValue::One(record)) => Ok(vec![record]),
        Err(e) => Err(ParseError {
            partition: partition.to_string(),
            key: String::from_utf8_lossy(key).into_owned(),
            message: e.to_string(),
        }),
    }
}
