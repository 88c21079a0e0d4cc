//! Configuration schema (bq2bq.toml)

use serde::{Deserialize, Serialize};

/// Number of hand-outs at which a cached client becomes eligible for reuse
pub const DEFAULT_MAX_REUSE: usize = 5;

/// Access scopes requested for every service-account credential
///
/// Warehouse, object storage and drive access (external tables backed by
/// sheets need the drive scope).
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/bigquery",
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/drive",
];

/// Client factory settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Reuse ceiling for a cached client
    #[serde(default = "default_max_reuse")]
    pub max_reuse: usize,

    /// Scopes requested when parsing credentials
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_max_reuse() -> usize {
    DEFAULT_MAX_REUSE
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_reuse: default_max_reuse(),
            scopes: default_scopes(),
        }
    }
}

impl ClientConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reuse == 0 {
            return Err(ConfigError::InvalidValue(
                "client.max_reuse must be at least 1".to_string(),
            ));
        }

        if self.scopes.is_empty() {
            return Err(ConfigError::InvalidValue(
                "client.scopes must list at least one scope".to_string(),
            ));
        }

        if let Some(blank) = self.scopes.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(format!(
                "client.scopes contains a blank entry: {:?}",
                blank
            )));
        }

        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Client factory settings
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.client.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
