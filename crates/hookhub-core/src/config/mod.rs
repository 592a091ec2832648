//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate. Each
//! sub-module represents a logical configuration section, and every field
//! carries a serde default so an empty file is a valid configuration.

pub mod circuit;
pub mod dispatch;
pub mod logging;
pub mod plugin;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use self::circuit::CircuitConfig;
pub use self::dispatch::{DispatchConfig, TieBreak};
pub use self::logging::LoggingConfig;
pub use self::plugin::{PluginOverride, PluginSystemConfig};

use crate::error::{AppError, AppResult};

/// Prefix for environment variable overrides, e.g.
/// `HOOKHUB__CIRCUIT__FAILURE_THRESHOLD=5`.
pub const ENV_PREFIX: &str = "HOOKHUB";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Plugin discovery and reload settings.
    pub plugins: PluginSystemConfig,
    /// Hook dispatch settings.
    pub dispatch: DispatchConfig,
    /// Per-plugin circuit breaker settings.
    pub circuit: CircuitConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a file (TOML, JSON or YAML, picked by
    /// extension) merged with `HOOKHUB__`-prefixed environment variables.
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load(path: &str) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(Path::new(path)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.validate()?;
        Ok(app)
    }

    /// Reject values that would make the plugin core misbehave.
    pub fn validate(&self) -> AppResult<()> {
        if self.circuit.failure_threshold == 0 {
            return Err(AppError::configuration(
                "circuit.failure_threshold must be at least 1",
            ));
        }
        if self.dispatch.timeout_ms == 0 {
            return Err(AppError::configuration("dispatch.timeout_ms must be positive"));
        }
        if self.dispatch.lifecycle_timeout_ms == 0 {
            return Err(AppError::configuration(
                "dispatch.lifecycle_timeout_ms must be positive",
            ));
        }
        if self.plugins.hot_reload && self.plugins.poll_interval_seconds == 0 {
            return Err(AppError::configuration(
                "plugins.poll_interval_seconds must be positive when hot_reload is on",
            ));
        }
        Ok(())
    }
}
