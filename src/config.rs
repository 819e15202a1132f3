//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, workspace
//! files and finally environment variables. Each section is owned by the
//! component it configures; this module only assembles and validates them.

use crate::cache::StorageConfig;
use crate::limiter::RateLimitConfig;
use crate::logging::LoggingConfig;
use crate::remote::RemoteConfig;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::environment::TOKEN_VAR;
pub use sources::workspace_file::ENV_NAME_VAR;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WiresyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Remote(String),
    RateLimit(String),
    Retry(String),
    Storage(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Remote(msg) => write!(f, "remote: {}", msg),
            ValidationError::RateLimit(msg) => write!(f, "rate_limit: {}", msg),
            ValidationError::Retry(msg) => write!(f, "retry: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl WiresyncConfig {
    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.remote.validate() {
            errors.push(ValidationError::Remote(e));
        }
        if let Err(e) = self.rate_limit.validate() {
            errors.push(ValidationError::RateLimit(e));
        }
        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }
        if self.storage.cache_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "cache_path cannot be empty".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy with the access token masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.remote.token.is_some() {
            copy.remote.token = Some("********".to_string());
        }
        copy
    }
}
