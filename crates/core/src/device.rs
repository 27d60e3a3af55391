// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device configuration consumed by the engine
//!
//! The configuration is rendered elsewhere; the engine only reads it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One command or a list of commands run in order on the dispatcher host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandList {
    One(String),
    Many(Vec<String>),
}

impl CommandList {
    pub fn commands(&self) -> Vec<&str> {
        match self {
            CommandList::One(cmd) => vec![cmd.as_str()],
            CommandList::Many(cmds) => cmds.iter().map(String::as_str).collect(),
        }
    }
}

/// A named user command with an optional undo step for cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCommand {
    #[serde(rename = "do")]
    pub run: String,
    #[serde(default)]
    pub undo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommands {
    /// Opens the interactive session to the device
    #[serde(default)]
    pub connect: Option<String>,
    #[serde(default)]
    pub power_off: Option<CommandList>,
    #[serde(default)]
    pub power_on: Option<CommandList>,
    #[serde(default)]
    pub users: BTreeMap<String, UserCommand>,
}

/// Methods a device supports for one stage (deploy, boot, test)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMethods {
    #[serde(default)]
    pub methods: Value,
}

/// Timeout overrides, shared shape between device and job definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutBlock {
    #[serde(default)]
    pub job: Option<Value>,
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub connection: Option<Value>,
    #[serde(default)]
    pub actions: BTreeMap<String, Value>,
    #[serde(default)]
    pub connections: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub commands: DeviceCommands,
    #[serde(default)]
    pub actions: BTreeMap<String, StageMethods>,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub timeouts: TimeoutBlock,
    /// Per-section delay between characters sent on a connection, in milliseconds
    #[serde(default)]
    pub character_delays: BTreeMap<String, u64>,
    #[serde(default)]
    pub constants: Value,
}

impl DeviceConfig {
    pub fn hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or("")
    }

    /// Method names listed for a stage.
    ///
    /// Methods may be given as a mapping of method to settings or as a list.
    pub fn methods(&self, stage: &str) -> Vec<String> {
        match self.actions.get(stage).map(|s| &s.methods) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(one)) => vec![one.clone()],
            _ => Vec::new(),
        }
    }

    pub fn has_method(&self, stage: &str, method: &str) -> bool {
        self.methods(stage).iter().any(|m| m == method)
    }

    /// Settings of one method, when the methods are a mapping
    pub fn method_settings(&self, stage: &str, method: &str) -> Option<&Value> {
        self.actions.get(stage)?.methods.get(method)
    }

    pub fn character_delay(&self, section: &str) -> u64 {
        self.character_delays.get(section).copied().unwrap_or(0)
    }

    /// Network interfaces declared under `parameters.interfaces`
    pub fn interfaces(&self) -> Option<&serde_json::Map<String, Value>> {
        self.parameters.get("interfaces")?.as_object()
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
