// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Action, ActionId, ActionMeta, ActionTree, Parameters, PipelineId};
use crate::connection::{CommandRunner, Connection, Connector};
use crate::device::DeviceConfig;
use crate::error::LavaError;
use crate::job::JobEnv;
use crate::protocol::Protocol;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

/// Given to [`Action::populate`] to build a child pipeline
pub struct PopulateContext<'a> {
    tree: &'a mut ActionTree,
    action: ActionId,
}

impl<'a> PopulateContext<'a> {
    pub(crate) fn new(tree: &'a mut ActionTree, action: ActionId) -> Self {
        Self { tree, action }
    }

    pub fn id(&self) -> ActionId {
        self.action
    }

    pub fn meta(&self) -> &ActionMeta {
        self.tree.meta(self.action)
    }

    pub fn meta_mut(&mut self) -> &mut ActionMeta {
        self.tree.meta_mut(self.action)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.meta().parameters
    }

    pub fn device(&self) -> &DeviceConfig {
        self.tree.device()
    }

    /// The child pipeline, created on first use with this action's parameters
    pub fn pipeline(&mut self) -> Result<PipelineId, LavaError> {
        let parameters = self.parameters().clone();
        self.tree.new_pipeline(self.action, parameters)
    }

    /// Append an action to the child pipeline
    pub fn add_action(
        &mut self,
        behavior: Box<dyn Action>,
        parameters: Option<Parameters>,
    ) -> Result<ActionId, LavaError> {
        let pipeline = self.pipeline()?;
        self.tree.push(pipeline, behavior, parameters)
    }

    pub fn tree(&mut self) -> &mut ActionTree {
        self.tree
    }
}

/// Given to [`Action::validate`]
pub struct ValidateContext<'a> {
    tree: &'a mut ActionTree,
    env: &'a JobEnv,
    action: ActionId,
}

impl<'a> ValidateContext<'a> {
    pub(crate) fn new(tree: &'a mut ActionTree, env: &'a JobEnv, action: ActionId) -> Self {
        Self { tree, env, action }
    }

    pub fn id(&self) -> ActionId {
        self.action
    }

    pub fn meta(&self) -> &ActionMeta {
        self.tree.meta(self.action)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.meta().parameters
    }

    pub fn device(&self) -> &DeviceConfig {
        self.tree.device()
    }

    pub fn child(&self) -> Option<PipelineId> {
        self.tree.child(self.action)
    }

    pub fn env(&self) -> &JobEnv {
        self.env
    }

    pub fn tree(&self) -> &ActionTree {
        self.tree
    }

    /// Record a validation error against this action
    pub fn error(&mut self, message: impl Into<String>) {
        self.tree.meta_mut(self.action).errors.push(message.into());
    }

    pub fn protocol(&self, name: &str) -> Option<&dyn Protocol> {
        self.env.protocols.get(name)
    }
}

/// Given to [`Action::run`] and [`Action::cleanup`]
pub struct RunContext<'a> {
    pub(crate) tree: &'a mut ActionTree,
    pub(crate) env: &'a mut JobEnv,
    action: ActionId,
    max_end_time: Option<Instant>,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        tree: &'a mut ActionTree,
        env: &'a mut JobEnv,
        action: ActionId,
        max_end_time: Option<Instant>,
    ) -> Self {
        Self {
            tree,
            env,
            action,
            max_end_time,
        }
    }

    pub fn id(&self) -> ActionId {
        self.action
    }

    pub fn meta(&self) -> &ActionMeta {
        self.tree.meta(self.action)
    }

    pub fn meta_mut(&mut self) -> &mut ActionMeta {
        self.tree.meta_mut(self.action)
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn level(&self) -> &str {
        self.meta().level()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.meta().parameters
    }

    pub fn namespace(&self) -> String {
        self.meta().namespace().to_string()
    }

    pub fn device(&self) -> &DeviceConfig {
        self.tree.device()
    }

    pub fn env(&self) -> &JobEnv {
        self.env
    }

    pub fn env_mut(&mut self) -> &mut JobEnv {
        self.env
    }

    pub fn tree(&self) -> &ActionTree {
        self.tree
    }

    /// Deadline of this action, already bounded by every enclosing timeout
    pub fn max_end_time(&self) -> Option<Instant> {
        self.max_end_time
    }

    /// Time left before the deadline, falling back to the action timeout
    pub fn remaining(&self) -> std::time::Duration {
        match self.max_end_time {
            Some(end) => end.saturating_duration_since(Instant::now()),
            None => self
                .meta()
                .timeout
                .duration()
                .unwrap_or(crate::timeout::ACTION_TIMEOUT),
        }
    }

    pub fn child(&self) -> Option<PipelineId> {
        self.tree.child(self.action)
    }

    pub fn runner(&self) -> Result<Arc<dyn CommandRunner>, LavaError> {
        self.env.runner()
    }

    pub fn connector(&self) -> Result<Arc<dyn Connector>, LavaError> {
        self.env.connector()
    }

    /// Copy of a value stored in this action's namespace
    pub fn get_namespace_data(&self, action: &str, label: &str, key: &str) -> Option<Value> {
        let namespace = self.meta().namespace();
        self.env.data.get(namespace, action, label, key).cloned()
    }

    /// Store a value in this action's namespace.
    ///
    /// An empty label or key stores nothing and records an error.
    pub fn set_namespace_data(&mut self, action: &str, label: &str, key: &str, value: Value) {
        if label.is_empty() || key.is_empty() {
            let message = format!("Invalid call to set_namespace_data: {}", action);
            tracing::error!(action, "{}", message);
            self.meta_mut().errors.push(message);
            return;
        }
        let namespace = self.namespace();
        self.env.data.set(&namespace, action, label, key, value);
    }

    pub fn set_result(&mut self, key: impl Into<String>, value: Value) {
        self.meta_mut().results.insert(key.into(), value);
    }

    /// Emit a result record through the job's sink
    pub fn emit(&self, record: &Value) {
        self.env.sink.results(record);
    }

    /// Run the protocol calls the job requested for this action.
    ///
    /// Collated replies are stored under the protocol's name.
    pub async fn call_protocols(&mut self) -> Result<(), LavaError> {
        let Some(requested) = self.parameters().get("protocols").cloned() else {
            return Ok(());
        };
        let name = self.name().to_string();
        let connection_timeout = self
            .meta()
            .connection_timeout
            .duration()
            .unwrap_or(crate::timeout::ACTION_TIMEOUT);
        let mut collated = Vec::new();
        for protocol in self.env.protocols.iter_mut() {
            let Some(calls) = requested.get(protocol.name()).and_then(Value::as_array) else {
                continue;
            };
            let calls: Vec<&Value> = calls
                .iter()
                .filter(|call| call.get("action").and_then(Value::as_str) == Some(name.as_str()))
                .collect();
            for call in calls {
                protocol.check_timeout(connection_timeout, call)?;
                tracing::info!(
                    action = %name,
                    protocol = protocol.name(),
                    "Making protocol call for {} using {}",
                    name,
                    protocol.name()
                );
                let reply = protocol.call(call).await?;
                if let Some((key, value)) = protocol.collate(&reply, call)? {
                    collated.push((protocol.name().to_string(), key, value));
                }
            }
        }
        for (protocol, key, value) in collated {
            tracing::info!("Setting namespace data key {} to {}", key, value);
            self.set_namespace_data(&protocol, &protocol, &key, value);
        }
        Ok(())
    }

    /// Run the child pipeline within this action's deadline
    pub async fn run_pipeline(
        &mut self,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), LavaError> {
        let child = self.child().ok_or_else(|| {
            LavaError::bug(format!("{} has no pipeline to run", self.meta().name))
        })?;
        crate::pipeline::run_actions(
            &mut *self.tree,
            &mut *self.env,
            child,
            connection,
            self.max_end_time,
        )
        .await
    }

    /// Clean up the child pipeline, if any
    pub async fn cleanup_pipeline(&mut self, connection: &mut Option<Box<dyn Connection>>) {
        if let Some(child) = self.child() {
            crate::pipeline::cleanup(&mut *self.tree, &mut *self.env, child, connection).await;
        }
    }
}
