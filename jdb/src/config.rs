//! jsondb configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `base-dir`
pub const ENV_BASE_DIR: &str = "JSONDB_BASE_DIR";

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one `<collection>.json` file per collection
    #[serde(rename = "base-dir")]
    pub base_dir: PathBuf,

    /// Hold an advisory lock file during each read-modify-write cycle
    #[serde(rename = "file-lock")]
    pub file_lock: bool,

    /// Pending commands buffered per collection actor
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(crate::DEFAULT_BASE_DIR),
            file_lock: true,
            channel_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .jsondb.yml
        let local_config = PathBuf::from(".jsondb.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/jsondb/jsondb.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jsondb").join("jsondb.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `JSONDB_BASE_DIR` when set and non-empty
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_BASE_DIR)
            && !dir.is_empty()
        {
            tracing::debug!(%dir, "apply_env: base dir overridden from environment");
            self.base_dir = PathBuf::from(dir);
        }
    }
}
