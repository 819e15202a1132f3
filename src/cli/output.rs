//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, Stage};

/// Map domain errors to a message for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::StageFailed {
            stage,
            local_artifacts,
            source,
        } => {
            let retained = match local_artifacts {
                0 => "no local artifacts exist".to_string(),
                1 => "1 local artifact is still available".to_string(),
                n => format!("{} local artifacts are still available", n),
            };
            let stage = match stage {
                Stage::Generation => "Generation failed",
                Stage::Sync => "Sync failed",
            };
            format!("{}: {} ({})", stage, map_error(source), retained)
        }
        ApiError::RetriesExhausted { attempts, last } => {
            format!("{} (gave up after {} attempts)", last, attempts)
        }
        ApiError::Unauthorized(_) => format!("{}; pass --token or set WIRESYNC_TOKEN", e),
        other => other.to_string(),
    }
}
