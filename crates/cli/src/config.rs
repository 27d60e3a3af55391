// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher configuration (`dispatcher.toml`)

use anyhow::{Context, Result};
use lava_protocols::{CoordinatorSettings, ProtocolSettings, VlandSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Parent of the per-job temporary directories
    pub tmp_dir: Option<PathBuf>,
    /// Default log filter when neither `--log-level` nor `RUST_LOG` is set
    pub log_level: Option<String>,
    pub coordinator: CoordinatorSettings,
    pub vland: VlandSettings,
}

impl DispatcherConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read configuration {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Invalid configuration {}", path.display()))
    }

    /// Load `path`, or `$XDG_CONFIG_HOME/lava/dispatcher.toml` when it
    /// exists, or the defaults
    pub fn locate(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn protocol_settings(&self, debug: bool) -> ProtocolSettings {
        ProtocolSettings {
            coordinator: self.coordinator.clone(),
            vland: self.vland.clone(),
            debug,
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lava").join("dispatcher.toml"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
