//! Environment source: WIRESYNC__SECTION__KEY variables and WIRESYNC_TOKEN

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Access token shortcut, equivalent to WIRESYNC__REMOTE__TOKEN
pub const TOKEN_VAR: &str = "WIRESYNC_TOKEN";

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let token = std::env::var(TOKEN_VAR)
        .ok()
        .filter(|token| !token.trim().is_empty());
    builder
        .add_source(
            Environment::with_prefix("WIRESYNC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("remote.token", token)
}
