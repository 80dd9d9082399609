//! Engine configuration.
//!
//! Provides [`EngineConfig`] with defaults from the core constants. Values
//! can be layered from an optional TOML file and `FLOWSHARES_*` environment
//! variables (e.g. `FLOWSHARES_SHARE_SCALE`, `FLOWSHARES_LOG_LEVEL`).

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use flowshares_core::constants::SHARE_SCALE;
use serde::{Deserialize, Serialize};

/// Configuration for an engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Divisor from flow rate to share count.
    pub share_scale: u128,
    /// Log level filter string (e.g. "info", "debug", "flowshares_engine=trace").
    pub log_level: String,
    /// Log output format: "text" or "json".
    pub log_format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            share_scale: SHARE_SCALE,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl EngineConfig {
    /// Default config file location: `<config_dir>/flowshares/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flowshares")
            .join("config.toml")
    }

    /// Load defaults, then `path` (if given, must exist), then the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load) with an explicit environment map in place
    /// of the process environment.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("share_scale", defaults.share_scale.to_string())?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", defaults.log_format)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("FLOWSHARES").source(env));

        let raw: RawConfig = builder.build()?.try_deserialize()?;
        let config = raw.parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.share_scale == 0 {
            return Err(ConfigError::Message("share_scale must be non-zero".into()));
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::Message(format!(
                "log_format must be \"text\" or \"json\", got {:?}",
                self.log_format
            )));
        }
        Ok(())
    }
}

/// String-typed intermediate so `share_scale` can exceed the 64-bit range
/// the config layer handles natively.
#[derive(Deserialize)]
struct RawConfig {
    share_scale: String,
    log_level: String,
    log_format: String,
}

impl RawConfig {
    fn parse(self) -> Result<EngineConfig, ConfigError> {
        let share_scale = self.share_scale.trim().parse::<u128>().map_err(|e| {
            ConfigError::Message(format!("share_scale {:?}: {e}", self.share_scale))
        })?;
        Ok(EngineConfig {
            share_scale,
            log_level: self.log_level,
            log_format: self.log_format,
        })
    }
}
