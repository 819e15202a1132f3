//! Persistence layer for the Artifact Cache

use crate::cache::legacy::{parse_legacy_value, CURRENT_SCHEMA_VERSION, LEGACY_PARTITIONS};
use crate::cache::{ArtifactCache, ConsolidationReport};
use crate::error::{ParseError, StorageError};
use crate::types::{Artifact, ArtifactId, NewArtifact, ProjectId};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Canonical, schema-versioned partition name
const CANONICAL_PARTITION: &str = "artifacts.v2";

const RECORD_PREFIX: &[u8] = b"rec\0";
const INDEX_PREFIX: &[u8] = b"idx\0";
const SCHEMA_VERSION_KEY: &[u8] = b"meta:schema_version";

fn record_prefix(project_id: &ProjectId) -> Vec<u8> {
    let mut key = RECORD_PREFIX.to_vec();
    key.extend_from_slice(project_id.as_str().as_bytes());
    key.push(0);
    key
}

fn record_key(project_id: &ProjectId, artifact_id: &ArtifactId) -> Vec<u8> {
    let mut key = record_prefix(project_id);
    key.extend_from_slice(artifact_id.as_str().as_bytes());
    key
}

fn index_key(artifact_id: &ArtifactId) -> Vec<u8> {
    let mut key = INDEX_PREFIX.to_vec();
    key.extend_from_slice(artifact_id.as_str().as_bytes());
    key
}

fn encode(artifact: &Artifact) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(artifact).map_err(|e| {
        StorageError::Serialization(format!("Failed to serialize artifact: {}", e))
    })
}

fn decode(bytes: &[u8]) -> Result<Artifact, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::Serialization(format!("Failed to deserialize artifact: {}", e))
    })
}

fn materialize(project_id: &ProjectId, draft: NewArtifact) -> Artifact {
    let now = Utc::now();
    Artifact {
        artifact_id: draft.artifact_id.unwrap_or_else(ArtifactId::generate),
        project_id: project_id.clone(),
        page_name: draft.page_name,
        markup: draft.markup,
        diagram_source: draft.diagram_source,
        metadata: draft.metadata,
        visual: None,
        version: draft.version.unwrap_or(1),
        origin: draft.origin,
        generated_at: draft.generated_at.unwrap_or(now),
        updated_at: draft.updated_at.unwrap_or(now),
    }
}

/// Sled-based implementation of ArtifactCache
///
/// Records and the artifact-id index share one tree so that every mutation is
/// a single atomic batch.
pub struct SledArtifactCache {
    db: sled::Db,
    artifacts: sled::Tree,
}

impl SledArtifactCache {
    /// Open (or create) a cache at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let artifacts = db.open_tree(CANONICAL_PARTITION)?;
        Ok(Self { db, artifacts })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Schema version currently recorded, 1 when never consolidated
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        match self.artifacts.get(SCHEMA_VERSION_KEY)? {
            Some(bytes) => {
                let raw = <[u8; 4]>::try_from(&bytes[..]).map_err(|_| {
                    StorageError::Serialization("Schema version is not a u32".to_string())
                })?;
                Ok(u32::from_be_bytes(raw))
            }
            None => Ok(1),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.artifacts.flush()?;
        Ok(())
    }

    fn project_of(&self, artifact_id: &ArtifactId) -> Result<Option<ProjectId>, StorageError> {
        match self.artifacts.get(index_key(artifact_id))? {
            Some(bytes) => Ok(Some(ProjectId::new(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))),
            None => Ok(None),
        }
    }

    /// Stage an insert of `artifact`, dropping any record of the same id held
    /// under a different project.
    fn stage_put(
        &self,
        batch: &mut sled::Batch,
        artifact: &Artifact,
        previous_project: Option<&ProjectId>,
    ) -> Result<(), StorageError> {
        if let Some(previous) = previous_project {
            if previous != &artifact.project_id {
                batch.remove(record_key(previous, &artifact.artifact_id));
            }
        }
        batch.insert(
            record_key(&artifact.project_id, &artifact.artifact_id),
            encode(artifact)?,
        );
        batch.insert(
            index_key(&artifact.artifact_id),
            artifact.project_id.as_str().as_bytes(),
        );
        Ok(())
    }

    /// Read one legacy partition completely. Any malformed value rejects the
    /// whole partition.
    fn read_legacy_partition(
        &self,
        name: &str,
    ) -> Result<Result<Vec<Artifact>, ParseError>, StorageError> {
        let tree = self.db.open_tree(name)?;
        let mut artifacts = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let records = match parse_legacy_value(name, &key, &value) {
                Ok(records) => records,
                Err(e) => return Ok(Err(e)),
            };
            for record in records {
                let project_id = record.project_id();
                artifacts.push(materialize(&project_id, record.into_new_artifact()));
            }
        }
        Ok(Ok(artifacts))
    }
}

impl ArtifactCache for SledArtifactCache {
    fn create(
        &self,
        project_id: &ProjectId,
        artifact: NewArtifact,
    ) -> Result<Artifact, StorageError> {
        let artifact = materialize(project_id, artifact);
        let existing = self.project_of(&artifact.artifact_id)?;
        if let Some(owner) = &existing {
            if owner != project_id {
                return Err(StorageError::DuplicateArtifact {
                    artifact_id: artifact.artifact_id.clone(),
                    project_id: owner.clone(),
                });
            }
        }

        let mut batch = sled::Batch::default();
        self.stage_put(&mut batch, &artifact, existing.as_ref())?;
        self.artifacts.apply_batch(batch)?;
        debug!(
            project_id = %project_id,
            artifact_id = %artifact.artifact_id,
            "Artifact stored"
        );
        Ok(artifact)
    }

    fn get(&self, artifact_id: &ArtifactId) -> Result<Option<Artifact>, StorageError> {
        let Some(project_id) = self.project_of(artifact_id)? else {
            return Ok(None);
        };
        match self.artifacts.get(record_key(&project_id, artifact_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update(&self, artifact: &Artifact) -> Result<Artifact, StorageError> {
        let existing = self
            .get(&artifact.artifact_id)?
            .ok_or_else(|| StorageError::ArtifactNotFound(artifact.artifact_id.clone()))?;
        if existing.project_id != artifact.project_id {
            return Err(StorageError::DuplicateArtifact {
                artifact_id: artifact.artifact_id.clone(),
                project_id: existing.project_id,
            });
        }

        let mut updated = artifact.clone();
        updated.version = existing.version.max(artifact.version) + 1;
        updated.updated_at = Utc::now();

        let mut batch = sled::Batch::default();
        self.stage_put(&mut batch, &updated, Some(&existing.project_id))?;
        self.artifacts.apply_batch(batch)?;
        Ok(updated)
    }

    fn delete(&self, artifact_id: &ArtifactId) -> Result<bool, StorageError> {
        let Some(project_id) = self.project_of(artifact_id)? else {
            return Ok(false);
        };
        let mut batch = sled::Batch::default();
        batch.remove(record_key(&project_id, artifact_id));
        batch.remove(index_key(artifact_id));
        self.artifacts.apply_batch(batch)?;
        Ok(true)
    }

    fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Artifact>, StorageError> {
        let mut artifacts = Vec::new();
        for item in self.artifacts.scan_prefix(record_prefix(project_id)) {
            let (_, value) = item?;
            artifacts.push(decode(&value)?);
        }
        artifacts.sort_by(|a, b| {
            a.generated_at
                .cmp(&b.generated_at)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        Ok(artifacts)
    }

    fn clear_project(&self, project_id: &ProjectId) -> Result<usize, StorageError> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for item in self.artifacts.scan_prefix(record_prefix(project_id)) {
            let (key, value) = item?;
            let artifact = decode(&value)?;
            batch.remove(key);
            batch.remove(index_key(&artifact.artifact_id));
            removed += 1;
        }
        self.artifacts.apply_batch(batch)?;
        debug!(project_id = %project_id, removed, "Project partition cleared");
        Ok(removed)
    }

    fn replace_project(
        &self,
        project_id: &ProjectId,
        artifacts: Vec<NewArtifact>,
    ) -> Result<Vec<Artifact>, StorageError> {
        let incoming: Vec<Artifact> = artifacts
            .into_iter()
            .map(|draft| materialize(project_id, draft))
            .collect();

        let mut seen = HashSet::new();
        for artifact in &incoming {
            if !seen.insert(&artifact.artifact_id) {
                return Err(StorageError::DuplicateArtifact {
                    artifact_id: artifact.artifact_id.clone(),
                    project_id: project_id.clone(),
                });
            }
            if let Some(owner) = self.project_of(&artifact.artifact_id)? {
                if &owner != project_id {
                    return Err(StorageError::DuplicateArtifact {
                        artifact_id: artifact.artifact_id.clone(),
                        project_id: owner,
                    });
                }
            }
        }

        // Later writes to the same key win within a batch.
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for item in self.artifacts.scan_prefix(record_prefix(project_id)) {
            let (key, value) = item?;
            let existing = decode(&value)?;
            batch.remove(key);
            batch.remove(index_key(&existing.artifact_id));
            removed += 1;
        }
        for artifact in &incoming {
            self.stage_put(&mut batch, artifact, None)?;
        }
        self.artifacts.apply_batch(batch)?;
        debug!(
            project_id = %project_id,
            removed,
            stored = incoming.len(),
            "Project collection replaced"
        );
        Ok(incoming)
    }

    fn consolidate(&self) -> Result<ConsolidationReport, StorageError> {
        let from_version = self.schema_version()?;
        if from_version >= CURRENT_SCHEMA_VERSION {
            return Ok(ConsolidationReport {
                already_current: true,
                from_version,
                to_version: from_version,
                ..Default::default()
            });
        }

        let mut report = ConsolidationReport {
            from_version,
            to_version: CURRENT_SCHEMA_VERSION,
            ..Default::default()
        };

        let present: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect();

        // Later partitions overwrite earlier ones.
        let mut merged: HashMap<ArtifactId, Artifact> = HashMap::new();
        let mut clean_partitions = Vec::new();
        for name in LEGACY_PARTITIONS {
            if !present.iter().any(|p| p == name) {
                continue;
            }
            match self.read_legacy_partition(name)? {
                Ok(artifacts) => {
                    debug!(partition = name, count = artifacts.len(), "Legacy partition read");
                    for artifact in artifacts {
                        if merged.insert(artifact.artifact_id.clone(), artifact).is_some() {
                            report.duplicates_overwritten += 1;
                        }
                    }
                    clean_partitions.push(name.to_string());
                }
                Err(parse_error) => {
                    debug!(
                        partition = name,
                        error = %parse_error,
                        "Skipping malformed legacy partition"
                    );
                    report.errors.push(parse_error);
                }
            }
        }

        let mut batch = sled::Batch::default();
        let mut merged: Vec<Artifact> = merged.into_values().collect();
        merged.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
        for artifact in &merged {
            let previous = self.project_of(&artifact.artifact_id)?;
            if previous.is_some() {
                report.duplicates_overwritten += 1;
            }
            self.stage_put(&mut batch, artifact, previous.as_ref())?;
        }
        batch.insert(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION.to_be_bytes().to_vec());
        self.artifacts.apply_batch(batch)?;

        for name in &clean_partitions {
            self.db.drop_tree(name.as_bytes())?;
        }
        self.db.flush()?;

        report.artifacts_merged = merged.len();
        report.partitions_merged = clean_partitions;
        info!(
            from_version = report.from_version,
            to_version = report.to_version,
            artifacts = report.artifacts_merged,
            partitions = report.partitions_merged.len(),
            errors = report.errors.len(),
            "Artifact cache consolidated"
        );
        Ok(report)
    }
}
