//! Error types for the wiresync artifact cache and generation pipeline.

use crate::types::{ArtifactId, ProjectId};
use std::fmt;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    #[error("Artifact {artifact_id} already belongs to project {project_id}")]
    DuplicateArtifact {
        artifact_id: ArtifactId,
        project_id: ProjectId,
    },

    #[error("Storage I/O error: {0}")]
    Io(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => StorageError::Io(io.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Unparseable content found in a legacy storage partition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed partition '{partition}' at key '{key}': {message}")]
pub struct ParseError {
    pub partition: String,
    pub key: String,
    pub message: String,
}

/// Stage of a generation round that produced a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generation,
    Sync,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Generation => write!(f, "generation"),
            Stage::Sync => write!(f, "sync"),
        }
    }
}

/// Errors surfaced by remote calls, reconciliation and orchestration
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote returned status {status}: {message}")]
    RemoteFailure { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Generation rejected by remote: {0}")]
    GenerationRejected(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ApiError> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed during {stage} stage ({local_artifacts} local artifacts retained): {source}")]
    StageFailed {
        stage: Stage,
        local_artifacts: usize,
        #[source]
        source: Box<ApiError>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// True when the message text reads like a throttling response
    pub fn is_throttling_message(message: &str) -> bool {
        let lowered = message.to_ascii_lowercase();
        lowered.contains("rate limit")
            || lowered.contains("too many requests")
            || lowered.contains("throttl")
    }

    /// Unwraps `StageFailed` and `RetriesExhausted` down to the underlying cause.
    pub fn root_cause(&self) -> &ApiError {
        match self {
            ApiError::StageFailed { source, .. } => source.root_cause(),
            ApiError::RetriesExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
