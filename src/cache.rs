//! Artifact Cache
//!
//! Device-local store of generated artifacts, partitioned by project. All
//! mutations replace whole records; there is no field-level patching.

pub mod legacy;
pub mod persistence;

pub use persistence::SledArtifactCache;

use crate::error::{ParseError, StorageError};
use crate::types::{Artifact, ArtifactId, CollectionSummary, NewArtifact, ProjectId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact cache interface
pub trait ArtifactCache: Send + Sync {
    /// Store a new artifact, assigning a fresh id unless the draft carries one.
    fn create(&self, project_id: &ProjectId, artifact: NewArtifact)
        -> Result<Artifact, StorageError>;

    fn get(&self, artifact_id: &ArtifactId) -> Result<Option<Artifact>, StorageError>;

    /// Replace an existing artifact record, bumping its version.
    fn update(&self, artifact: &Artifact) -> Result<Artifact, StorageError>;

    /// Remove one artifact. Returns false if it was not present.
    fn delete(&self, artifact_id: &ArtifactId) -> Result<bool, StorageError>;

    fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Artifact>, StorageError>;

    /// Remove every artifact of a project. Returns the number removed.
    fn clear_project(&self, project_id: &ProjectId) -> Result<usize, StorageError>;

    /// Replace the project's whole collection in one atomic write.
    ///
    /// Fails without touching the cache if the incoming set repeats an id or
    /// uses an id owned by another project.
    fn replace_project(
        &self,
        project_id: &ProjectId,
        artifacts: Vec<NewArtifact>,
    ) -> Result<Vec<Artifact>, StorageError>;

    /// Merge legacy partitions into the canonical one; no-op once current.
    fn consolidate(&self) -> Result<ConsolidationReport, StorageError>;

    fn summary(&self, project_id: &ProjectId) -> Result<CollectionSummary, StorageError> {
        let artifacts = self.list_by_project(project_id)?;
        Ok(CollectionSummary::from_artifacts(&artifacts))
    }
}

/// Result of a consolidation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    /// True when the schema was already current and nothing was scanned
    pub already_current: bool,
    pub from_version: u32,
    pub to_version: u32,
    /// Legacy partitions merged and dropped
    pub partitions_merged: Vec<String>,
    pub artifacts_merged: usize,
    /// Artifacts that replaced an earlier record with the same id
    pub duplicates_overwritten: usize,
    /// Malformed partitions, left in place
    pub errors: Vec<ParseError>,
}

impl ConsolidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Storage location configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "wiresync")
        .map(|dirs| dirs.data_dir().join("cache"))
        .unwrap_or_else(|| PathBuf::from(".wiresync/cache"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
        }
    }
}
