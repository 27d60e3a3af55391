// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator configuration

use std::path::{Path, PathBuf};

use lava_protocols::settings::COORDINATOR_PORT;
use serde::Deserialize;
use thiserror::Error;

/// Read when no configuration path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lava-coordinator/lava-coordinator.toml";

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to listen on
    pub host: String,
    pub port: u16,
    /// Read buffer size per connection
    pub blocksize: usize,
    /// Log file; logs go to stderr when unset
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: COORDINATOR_PORT,
            blocksize: 4 * 1024,
            log_path: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Load `path`, or the default file when it exists, or the defaults
    pub fn locate(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Invalid configuration {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Log path {0} has no parent directory")]
    LogPath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
