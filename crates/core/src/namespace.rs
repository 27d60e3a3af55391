// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job data shared between actions, partitioned by namespace

use serde_json::Value;
use std::collections::BTreeMap;

/// Namespace used when an action does not declare one
pub const DEFAULT_NAMESPACE: &str = "common";

type Labels = BTreeMap<String, BTreeMap<String, Value>>;

/// Store keyed by `(namespace, action, label, key)`.
///
/// Last writer wins. Nothing is cleared implicitly for the lifetime of a job.
#[derive(Debug, Default, Clone)]
pub struct NamespaceData {
    data: BTreeMap<String, BTreeMap<String, Labels>>,
}

impl NamespaceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value, or `None` when nothing was ever set.
    ///
    /// A stored JSON `null` comes back as `Some(Value::Null)`.
    pub fn get(&self, namespace: &str, action: &str, label: &str, key: &str) -> Option<&Value> {
        self.data
            .get(namespace)?
            .get(action)?
            .get(label)?
            .get(key)
    }

    pub fn set(&mut self, namespace: &str, action: &str, label: &str, key: &str, value: Value) {
        self.data
            .entry(namespace.to_string())
            .or_default()
            .entry(action.to_string())
            .or_default()
            .entry(label.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Every key stored under one label of one action
    pub fn label(&self, namespace: &str, action: &str, label: &str) -> Option<&BTreeMap<String, Value>> {
        self.data.get(namespace)?.get(action)?.get(label)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Namespace named by an action's parameters
pub fn namespace_of(parameters: &serde_json::Map<String, Value>) -> &str {
    parameters
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAMESPACE)
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod tests;
