// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destinations for result records emitted by actions and the job

use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Receives structured result records.
///
/// Records are `{definition, case, result, ...}` mappings. The engine never
/// stores them itself.
pub trait ResultSink: Send + Sync {
    fn results(&self, record: &Value);
}

/// Forwards every record as an INFO event on target `lava::results`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn results(&self, record: &Value) {
        tracing::info!(target: "lava::results", results = %record, "results");
    }
}

/// Keeps records in memory for inspection
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Value>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Value> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Records whose `case` equals `case`
    pub fn case(&self, case: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| r.get("case").and_then(Value::as_str) == Some(case))
            .collect()
    }
}

impl ResultSink for MemorySink {
    fn results(&self, record: &Value) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}
