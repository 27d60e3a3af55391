// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions and the arena that holds them
//!
//! The job owns one [`ActionTree`]. Pipelines hold indices into it instead
//! of owning actions, and every behavior receives the tree and the job
//! environment through an explicit context.

mod context;
mod tree;

pub use context::{PopulateContext, RunContext, ValidateContext};
pub use tree::{ActionTree, PipelineNode};

use crate::connection::Connection;
use crate::error::LavaError;
use crate::timeout::{Timeout, ACTION_TIMEOUT};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Parameters of an action, copied from the job definition
pub type Parameters = serde_json::Map<String, Value>;

/// Index of an action record in the [`ActionTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub(crate) usize);

/// Index of a pipeline in the [`ActionTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub(crate) usize);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline#{}", self.0)
    }
}

/// Engine-managed state of one action
#[derive(Debug, Clone)]
pub struct ActionMeta {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub section: Option<String>,
    /// Dotted position in the tree, `None` until the action is attached
    pub level: Option<String>,
    pub parameters: Parameters,
    pub timeout: Timeout,
    pub connection_timeout: Timeout,
    pub max_retries: u32,
    pub errors: Vec<String>,
    pub results: serde_json::Map<String, Value>,
    pub character_delay: Duration,
}

impl ActionMeta {
    pub(crate) fn from_behavior(behavior: &dyn Action) -> Self {
        Self {
            name: behavior.name().to_string(),
            summary: behavior.summary().to_string(),
            description: behavior.description().to_string(),
            section: behavior.section().map(str::to_string),
            level: None,
            parameters: Parameters::new(),
            timeout: behavior.timeout(),
            connection_timeout: behavior.connection_timeout(),
            max_retries: 1,
            errors: Vec::new(),
            results: serde_json::Map::new(),
            character_delay: Duration::ZERO,
        }
    }

    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        crate::namespace::namespace_of(&self.parameters)
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Behavior of an action.
///
/// An action either does leaf work in `run` or orchestrates a child
/// pipeline built in `populate`. The default `run` makes the protocol calls
/// requested for this action and then runs the child pipeline.
#[async_trait]
pub trait Action: Send {
    fn name(&self) -> &str;

    fn summary(&self) -> &str;

    fn description(&self) -> &str;

    fn section(&self) -> Option<&str> {
        None
    }

    fn timeout(&self) -> Timeout {
        Timeout::new(self.name(), ACTION_TIMEOUT)
    }

    fn connection_timeout(&self) -> Timeout {
        Timeout::new(self.name(), ACTION_TIMEOUT)
    }

    /// Type name reported by non-summary descriptions
    fn class(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Build the child pipeline, if any
    fn populate(&mut self, _cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
        Ok(())
    }

    /// Check parameters and prerequisites.
    ///
    /// Record problems with [`ValidateContext::error`]. Returning a Job error
    /// records it against this action; any other error aborts validation.
    fn validate(&mut self, _cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        Ok(())
    }

    /// Do the work, returning a replacement connection when one was opened
    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        cx.call_protocols().await?;
        if cx.child().is_some() {
            cx.run_pipeline(connection).await?;
        } else if let Some(conn) = connection.as_mut() {
            conn.set_timeout(cx.meta().connection_timeout.clone());
        }
        Ok(None)
    }

    /// Release resources left behind by a failed or interrupted run
    async fn cleanup(
        &mut self,
        _cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), LavaError> {
        Ok(())
    }

    /// Stable extra fields for the pipeline description
    fn describe(&self) -> Option<Value> {
        None
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
