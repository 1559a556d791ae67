//! Configuration management for namechain.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; the chain store and name index live side by side in it
    pub data_dir: PathBuf,
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_create_if_missing() -> bool {
    true
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                create_if_missing: true,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Same config rooted at a different data directory
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.storage.data_dir = data_dir.as_ref().to_path_buf();
        self
    }
}
