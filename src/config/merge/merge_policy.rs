//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources replace earlier values key by key; tables merge.

use crate::cache::StorageConfig;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let storage = StorageConfig::default();
    Config::builder()
        .set_default("remote.base_url", "http://localhost:8000/api")?
        .set_default("remote.local_generation_url", "http://localhost:8001")?
        .set_default(
            "storage.cache_path",
            storage.cache_path.to_string_lossy().into_owned(),
        )?
        .set_default("logging.level", "info")
}
