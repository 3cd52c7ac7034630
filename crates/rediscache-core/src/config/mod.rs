//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from an
//! optional TOML file overlaid with environment variables. Each sub-module
//! represents a logical configuration section.

pub mod cache;
pub mod logging;

use serde::{Deserialize, Serialize};

use self::cache::CacheConfiguration;
use self::logging::LoggingConfig;

use crate::error::AppError;

/// Prefix for environment variable overrides (`REDISCACHE__CACHE__ENDPOINT`).
pub const ENV_PREFIX: &str = "REDISCACHE";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store connection settings shared by every named client.
    pub cache: CacheConfiguration,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file and the environment.
    ///
    /// The file is optional; values from `REDISCACHE__*` environment
    /// variables take precedence over it. The cache section is validated
    /// before it is returned.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        if config.get_table(CacheConfiguration::SECTION_NAME).is_err() {
            return Err(AppError::configuration(format!(
                "Missing '{section}' configuration section; set it in '{path}' or via {ENV_PREFIX}__{upper}__ENDPOINT and {ENV_PREFIX}__{upper}__SECRET",
                section = CacheConfiguration::SECTION_NAME,
                upper = CacheConfiguration::SECTION_NAME.to_ascii_uppercase(),
            )));
        }

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.cache.validate()?;
        Ok(app)
    }
}
