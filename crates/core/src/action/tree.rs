// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Action, ActionId, ActionMeta, Parameters, PipelineId, PopulateContext};
use crate::device::{DeviceConfig, TimeoutBlock};
use crate::error::LavaError;
use crate::timeout::Timeout;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Parked = Arc<Mutex<Vec<(ActionId, Box<dyn Action>)>>>;

struct ActionNode {
    meta: ActionMeta,
    /// Taken out while the behavior runs
    behavior: Option<Box<dyn Action>>,
    /// Child pipeline orchestrated by this action
    pipeline: Option<PipelineId>,
    /// Pipeline this action belongs to
    owner: Option<PipelineId>,
}

/// An ordered sequence of actions
#[derive(Debug, Clone, Default)]
pub struct PipelineNode {
    pub actions: Vec<ActionId>,
    /// Owning action; `None` for the root pipeline
    pub parent: Option<ActionId>,
    /// Parameters given to actions added without their own
    pub parameters: Parameters,
}

/// Arena of action records and pipelines for one job
pub struct ActionTree {
    nodes: Vec<ActionNode>,
    pipelines: Vec<PipelineNode>,
    device: Arc<DeviceConfig>,
    /// Timeout overrides, device first then job
    overrides: Vec<TimeoutBlock>,
    /// Behaviors whose run was dropped before they were restored
    parked: Parked,
}

/// A behavior lent out of the tree for one async run or cleanup.
///
/// A loan dropped without [`ActionTree::restore_loan`] (the run future was
/// canceled) parks its behavior; the tree takes it back on the next lend.
pub(crate) struct Loan {
    id: ActionId,
    behavior: Option<Box<dyn Action>>,
    parked: Parked,
}

impl Loan {
    pub(crate) fn behavior(&mut self) -> Result<&mut Box<dyn Action>, LavaError> {
        self.behavior
            .as_mut()
            .ok_or_else(|| LavaError::bug(format!("Action {} was already returned", self.id)))
    }
}

impl Drop for Loan {
    fn drop(&mut self) {
        if let Some(behavior) = self.behavior.take() {
            tracing::debug!("parking the behavior of canceled action {}", self.id);
            self.parked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((self.id, behavior));
        }
    }
}

impl ActionTree {
    pub fn new(device: Arc<DeviceConfig>, job_timeouts: TimeoutBlock) -> Self {
        let overrides = vec![device.timeouts.clone(), job_timeouts];
        Self {
            nodes: Vec::new(),
            pipelines: vec![PipelineNode::default()],
            device,
            overrides,
            parked: Arc::default(),
        }
    }

    pub fn root(&self) -> PipelineId {
        PipelineId(0)
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn device_arc(&self) -> Arc<DeviceConfig> {
        Arc::clone(&self.device)
    }

    /// Create a detached action record
    pub fn insert(&mut self, behavior: Box<dyn Action>) -> ActionId {
        let meta = ActionMeta::from_behavior(behavior.as_ref());
        self.nodes.push(ActionNode {
            meta,
            behavior: Some(behavior),
            pipeline: None,
            owner: None,
        });
        ActionId(self.nodes.len() - 1)
    }

    /// Insert and attach in one step
    pub fn push(
        &mut self,
        pipeline: PipelineId,
        behavior: Box<dyn Action>,
        parameters: Option<Parameters>,
    ) -> Result<ActionId, LavaError> {
        let id = self.insert(behavior);
        self.add_action(pipeline, id, parameters)?;
        Ok(id)
    }

    /// Create the child pipeline of an attached action
    pub fn new_pipeline(
        &mut self,
        parent: ActionId,
        parameters: Parameters,
    ) -> Result<PipelineId, LavaError> {
        let node = self.node(parent)?;
        if node.meta.level.is_none() {
            return Err(LavaError::bug(
                "Tried to create a pipeline using a parent action with no level set.",
            ));
        }
        if let Some(existing) = node.pipeline {
            return Ok(existing);
        }
        self.pipelines.push(PipelineNode {
            actions: Vec::new(),
            parent: Some(parent),
            parameters,
        });
        let id = PipelineId(self.pipelines.len() - 1);
        self.nodes[parent.0].pipeline = Some(id);
        Ok(id)
    }

    /// Attach a detached action to the end of `pipeline`.
    ///
    /// Assigns the level, sets parameters, populates the action and applies
    /// timeout overrides.
    pub fn add_action(
        &mut self,
        pipeline: PipelineId,
        id: ActionId,
        parameters: Option<Parameters>,
    ) -> Result<(), LavaError> {
        self.node(id)?;
        let parent = self.pipeline_node(pipeline)?.parent;
        if self.is_ancestor(id, pipeline) {
            return Err(LavaError::bug(format!(
                "Cannot add {} to a pipeline below itself",
                self.nodes[id.0].meta.name
            )));
        }
        if self.nodes[id.0].owner.is_some() {
            return Err(LavaError::bug(format!(
                "Action {} already belongs to a pipeline",
                self.nodes[id.0].meta.name
            )));
        }

        let position = {
            let node = &mut self.pipelines[pipeline.0];
            node.actions.push(id);
            node.actions.len()
        };
        let (level, parent_section) = match parent {
            Some(parent) => {
                let meta = &self.nodes[parent.0].meta;
                (format!("{}.{}", meta.level(), position), meta.section.clone())
            }
            None => (position.to_string(), None),
        };
        let parameters = parameters.unwrap_or_else(|| self.pipelines[pipeline.0].parameters.clone());

        {
            let device = Arc::clone(&self.device);
            let node = &mut self.nodes[id.0];
            node.owner = Some(pipeline);
            let meta = &mut node.meta;
            meta.level = Some(level);
            if meta.section.is_none() {
                meta.section = parent_section;
            }
            apply_parameters(meta, parameters, &device)?;
        }

        self.populate(id)?;
        self.apply_timeout_overrides(id)
    }

    fn populate(&mut self, id: ActionId) -> Result<(), LavaError> {
        let mut behavior = self.take_behavior(id)?;
        let result = {
            let mut cx = PopulateContext::new(self, id);
            behavior.populate(&mut cx)
        };
        self.restore_behavior(id, behavior);
        result
    }

    fn apply_timeout_overrides(&mut self, id: ActionId) -> Result<(), LavaError> {
        let name = self.nodes[id.0].meta.name.clone();
        let merged = |pick: &dyn Fn(&TimeoutBlock) -> Option<Value>| {
            self.overrides.iter().fold(None, |acc, block| pick(block).or(acc))
        };
        let action = merged(&|b| b.action.clone());
        let named = merged(&|b| b.actions.get(&name).cloned());
        let connection = merged(&|b| b.connection.clone());
        let named_connection = merged(&|b| b.connections.get(&name).cloned());

        let meta = &mut self.nodes[id.0].meta;
        let param = meta.parameters.get("timeout").cloned();
        let param_connection = meta.parameters.get("connection_timeout").cloned();

        if meta.timeout.is_protected() {
            if named.is_some() {
                meta.errors.push(format!(
                    "Trying to modify a protected timeout: {}.",
                    meta.timeout.name()
                ));
            }
        } else {
            for value in [action, named, param].into_iter().flatten() {
                meta.timeout.set_duration(Timeout::parse(&value)?);
            }
        }
        for value in [connection, named_connection, param_connection].into_iter().flatten() {
            meta.connection_timeout.set_duration(Timeout::parse(&value)?);
        }
        Ok(())
    }

    fn is_ancestor(&self, id: ActionId, pipeline: PipelineId) -> bool {
        let mut current = self.pipelines.get(pipeline.0).and_then(|p| p.parent);
        while let Some(action) = current {
            if action == id {
                return true;
            }
            current = self.nodes[action.0]
                .owner
                .and_then(|owner| self.pipelines[owner.0].parent);
        }
        false
    }

    fn node(&self, id: ActionId) -> Result<&ActionNode, LavaError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| LavaError::bug(format!("Unknown action {}", id)))
    }

    fn pipeline_node(&self, id: PipelineId) -> Result<&PipelineNode, LavaError> {
        self.pipelines
            .get(id.0)
            .ok_or_else(|| LavaError::bug(format!("Unknown pipeline {}", id)))
    }

    /// Lend a behavior for work that may be canceled
    pub(crate) fn lend_behavior(&mut self, id: ActionId) -> Result<Loan, LavaError> {
        let behavior = self.take_behavior(id)?;
        Ok(Loan {
            id,
            behavior: Some(behavior),
            parked: Arc::clone(&self.parked),
        })
    }

    pub(crate) fn restore_loan(&mut self, mut loan: Loan) {
        if let Some(behavior) = loan.behavior.take() {
            self.restore_behavior(loan.id, behavior);
        }
    }

    /// Put back behaviors parked by canceled runs
    pub(crate) fn reclaim(&mut self) {
        let parked: Vec<_> = self
            .parked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for (id, behavior) in parked {
            self.restore_behavior(id, behavior);
        }
    }

    pub(crate) fn take_behavior(&mut self, id: ActionId) -> Result<Box<dyn Action>, LavaError> {
        self.reclaim();
        let name = self.nodes.get(id.0).map(|n| n.meta.name.clone()).unwrap_or_default();
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.behavior.take())
            .ok_or_else(|| LavaError::bug(format!("Action {} is already running", name)))
    }

    pub(crate) fn restore_behavior(&mut self, id: ActionId, behavior: Box<dyn Action>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.behavior = Some(behavior);
        }
    }

    pub fn meta(&self, id: ActionId) -> &ActionMeta {
        &self.nodes[id.0].meta
    }

    pub fn meta_mut(&mut self, id: ActionId) -> &mut ActionMeta {
        &mut self.nodes[id.0].meta
    }

    pub fn actions(&self, pipeline: PipelineId) -> &[ActionId] {
        self.pipelines
            .get(pipeline.0)
            .map(|p| p.actions.as_slice())
            .unwrap_or(&[])
    }

    pub fn pipeline(&self, pipeline: PipelineId) -> Option<&PipelineNode> {
        self.pipelines.get(pipeline.0)
    }

    /// Owning action of a pipeline
    pub fn parent(&self, pipeline: PipelineId) -> Option<ActionId> {
        self.pipelines.get(pipeline.0).and_then(|p| p.parent)
    }

    /// Child pipeline of an action
    pub fn child(&self, id: ActionId) -> Option<PipelineId> {
        self.nodes.get(id.0).and_then(|n| n.pipeline)
    }

    /// Pipeline an action belongs to
    pub fn owner(&self, id: ActionId) -> Option<PipelineId> {
        self.nodes.get(id.0).and_then(|n| n.owner)
    }

    /// First attached action with `name`, in tree order
    pub fn find(&self, name: &str) -> Option<ActionId> {
        self.walk(self.root()).into_iter().find(|id| self.meta(*id).name == name)
    }

    /// Every attached action below `pipeline`, depth first
    pub fn walk(&self, pipeline: PipelineId) -> Vec<ActionId> {
        let mut out = Vec::new();
        for id in self.actions(pipeline) {
            out.push(*id);
            if let Some(child) = self.child(*id) {
                out.extend(self.walk(child));
            }
        }
        out
    }

    /// Errors of every action below `pipeline`, in tree order
    pub fn errors(&self, pipeline: PipelineId) -> Vec<String> {
        self.walk(pipeline)
            .into_iter()
            .flat_map(|id| self.meta(id).errors.iter().cloned())
            .collect()
    }

    /// Structural description of a pipeline.
    ///
    /// Contains no per-run state, so describing an unchanged tree twice
    /// yields the same value.
    pub fn describe(&self, pipeline: PipelineId, summary: bool) -> Value {
        let entries = self
            .actions(pipeline)
            .iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                let meta = &node.meta;
                let mut current = if summary {
                    let mut map = serde_json::Map::new();
                    if let Some(Value::Object(extra)) =
                        node.behavior.as_ref().and_then(|b| b.describe())
                    {
                        map.extend(extra);
                    }
                    map.insert("name".into(), json!(meta.name));
                    map.insert("description".into(), json!(meta.description));
                    map.insert("summary".into(), json!(meta.summary));
                    map.insert("level".into(), json!(meta.level()));
                    map.insert("max_retries".into(), json!(meta.max_retries));
                    map.insert(
                        "timeout".into(),
                        json!({
                            "name": meta.timeout.name(),
                            "duration": meta.timeout.duration().map(|d| d.as_secs()),
                        }),
                    );
                    map
                } else {
                    let class = node.behavior.as_ref().map(|b| b.class()).unwrap_or("");
                    let mut map = serde_json::Map::new();
                    map.insert("class".into(), json!(class));
                    map.insert("name".into(), json!(meta.name));
                    map
                };
                if let Some(child) = node.pipeline {
                    let sub = self.describe(child, summary);
                    if sub.as_array().is_some_and(|a| !a.is_empty()) {
                        current.insert("pipeline".into(), sub);
                    }
                }
                Value::Object(current)
            })
            .collect();
        Value::Array(entries)
    }
}

/// Store parameters and derive retry count and character delay from them
fn apply_parameters(
    meta: &mut ActionMeta,
    parameters: Parameters,
    device: &DeviceConfig,
) -> Result<(), LavaError> {
    if parameters.contains_key("failure_retry") && parameters.contains_key("repeat") {
        meta.errors
            .push("Unable to use repeat and failure_retry, use a repeat block".to_string());
    }
    let constant = |key: &str| {
        device
            .constants
            .get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
    };
    let retries = parameters
        .get("failure_retry")
        .and_then(Value::as_u64)
        .or_else(|| {
            let boot_retry = constant("boot_retry").filter(|_| meta.section.as_deref() == Some("boot"));
            boot_retry.or_else(|| constant("failure_retry"))
        });
    let count = |key: &str, value: u64| {
        u32::try_from(value.max(1))
            .map_err(|_| LavaError::job(format!("Invalid {} count for {}: {}", key, meta.name, value)))
    };
    if let Some(retries) = retries {
        meta.max_retries = count("failure_retry", retries)?;
    }
    if let Some(repeat) = parameters.get("repeat").and_then(Value::as_u64) {
        meta.max_retries = count("repeat", repeat)?;
    }
    if let Some(section) = meta.section.as_deref() {
        meta.character_delay = Duration::from_millis(device.character_delay(section));
    }
    meta.parameters = parameters;
    Ok(())
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
