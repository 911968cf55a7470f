//! Runtime configuration
//!
//! Loaded from YAML (`--config FILE`, else `<config dir>/recast/config.yaml`),
//! then adjusted by `RECAST_*` environment variables. A missing file is not
//! an error: defaults apply.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use post_ui::UiTimings;
use recast_core_types::{BehaviorMode, ExtensionState, ParseModeError, RewriteMode};
use rewrite_service::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use site_adapters::SiteKind;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

pub const ENV_REWRITE_TIMEOUT_MS: &str = "RECAST_REWRITE_TIMEOUT_MS";
pub const ENV_BEHAVIOR: &str = "RECAST_BEHAVIOR";
pub const ENV_MODE: &str = "RECAST_MODE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to locate the user config directory")]
    NoConfigDir,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: {reason}")]
    InvalidOverride { var: &'static str, reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecastConfig {
    /// Upper bound on a single rewrite round trip.
    pub rewrite_timeout_ms: u64,
    pub success_display_ms: u64,
    pub error_display_ms: u64,
    /// Buffered state changes before slow listeners start lagging.
    pub state_channel_capacity: usize,
    /// Sites whose adapters are held back and never claim a page.
    pub stubbed_sites: Vec<SiteKind>,
    /// State the in-process state center starts from.
    pub initial_state: ExtensionState,
}

impl Default for RecastConfig {
    fn default() -> Self {
        Self {
            rewrite_timeout_ms: DEFAULT_TIMEOUT_MS,
            success_display_ms: 2000,
            error_display_ms: 2000,
            state_channel_capacity: 64,
            stubbed_sites: Vec::new(),
            initial_state: ExtensionState {
                enabled: true,
                rewrite_mode: RewriteMode::Tldr,
                behavior_mode: BehaviorMode::Manual,
                model_loaded: false,
                is_initializing: false,
            },
        }
    }
}

impl RecastConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn rewrite_timeout(&self) -> Duration {
        Duration::from_millis(self.rewrite_timeout_ms)
    }

    pub fn ui_timings(&self) -> UiTimings {
        UiTimings {
            success_display: Duration::from_millis(self.success_display_ms),
            error_display: Duration::from_millis(self.error_display_ms),
        }
    }

    /// Applies `RECAST_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_REWRITE_TIMEOUT_MS) {
            self.rewrite_timeout_ms =
                raw.trim()
                    .parse()
                    .map_err(|err: std::num::ParseIntError| ConfigError::InvalidOverride {
                        var: ENV_REWRITE_TIMEOUT_MS,
                        reason: err.to_string(),
                    })?;
            info!(timeout_ms = self.rewrite_timeout_ms, "rewrite timeout overridden from environment");
        }
        if let Some(raw) = lookup(ENV_BEHAVIOR) {
            self.initial_state.behavior_mode = raw.parse().map_err(|err: ParseModeError| {
                ConfigError::InvalidOverride {
                    var: ENV_BEHAVIOR,
                    reason: err.to_string(),
                }
            })?;
        }
        if let Some(raw) = lookup(ENV_MODE) {
            self.initial_state.rewrite_mode = raw.parse().map_err(|err: ParseModeError| {
                ConfigError::InvalidOverride {
                    var: ENV_MODE,
                    reason: err.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

pub struct LoadedConfig {
    pub config: RecastConfig,
    pub path: PathBuf,
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push("recast");
    path.push("config.yaml");
    Ok(path)
}

pub async fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;
        let config = RecastConfig::from_yaml_str(&content)?;
        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        RecastConfig::default()
    };

    config.apply_env_overrides()?;
    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}
