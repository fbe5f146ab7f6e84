//! Declarative façade configuration.
//!
//! ```toml
//! auto_close = true
//! chunk_size = 65536
//!
//! [[mounts]]
//! path = "/scratch"
//! locator = "mem://"
//!
//! [[mounts]]
//! path = "/home"
//! locator = "osfs://~?read_only"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::vfs::{TransferOptions, DEFAULT_CHUNK_SIZE};

/// Errors from loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A locator to mount at a path when the façade is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub path: String,
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountFsConfig {
    /// Close handle mounts along with the façade.
    pub auto_close: bool,
    /// Chunk size for uploads and downloads.
    pub chunk_size: usize,
    pub mounts: Vec<MountEntry>,
}

impl Default for MountFsConfig {
    fn default() -> Self {
        Self {
            auto_close: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mounts: Vec::new(),
        }
    }
}

impl MountFsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file. `~` in the path is expanded.
    pub fn load(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        let expanded = shellexpand::tilde(path.as_ref());
        let path = Path::new(expanded.as_ref());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded mount config");
        Self::from_toml_str(&text)
    }

    /// Transfer options using the configured chunk size.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions::default().with_chunk_size(self.chunk_size)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        for entry in &self.mounts {
            if entry.locator.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mount {} has an empty locator",
                    entry.path
                )));
            }
        }
        Ok(())
    }
}
