// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service endpoints used by the protocols

use lava_core::LavaError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const COORDINATOR_PORT: u16 = 3079;
pub const COORDINATOR_DEBUG_PORT: u16 = 3179;
pub const VLAND_PORT: u16 = 3080;

/// Coordinator endpoint.
///
/// Reads both the coordinator's own JSON settings file and the
/// `[coordinator]` table of the dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub port: u16,
    pub blocksize: usize,
    /// Seconds between polls while the coordinator answers `wait`
    pub poll_delay: u64,
    #[serde(alias = "host")]
    pub coordinator_hostname: String,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            port: COORDINATOR_PORT,
            blocksize: 4 * 1024,
            poll_delay: 1,
            coordinator_hostname: "localhost".to_string(),
        }
    }
}

impl CoordinatorSettings {
    /// Settings used when the protocol runs without a coordinator
    pub fn debug() -> Self {
        Self {
            port: COORDINATOR_DEBUG_PORT,
            poll_delay: 3,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, LavaError> {
        serde_json::from_str(text).map_err(|e| {
            LavaError::infrastructure(format!("Invalid JSON settings for lava-multinode: {}", e))
        })
    }

    pub fn read(path: &Path) -> Result<Self, LavaError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LavaError::infrastructure(format!(
                "Missing coordinator configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&text)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay)
    }
}

/// VLANd endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlandSettings {
    pub port: u16,
    pub poll_delay: u64,
    #[serde(alias = "host")]
    pub vland_hostname: String,
}

impl Default for VlandSettings {
    fn default() -> Self {
        Self {
            port: VLAND_PORT,
            poll_delay: 1,
            vland_hostname: "localhost".to_string(),
        }
    }
}

impl VlandSettings {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay)
    }
}

/// Everything `select_all` needs to build protocols
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    pub coordinator: CoordinatorSettings,
    pub vland: VlandSettings,
    /// Use the debug coordinator endpoint and skip group setup
    pub debug: bool,
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
