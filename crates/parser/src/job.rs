// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Building a job from its YAML definition
//!
//! Every stage block becomes one top-level action chosen by strategy
//! selection. Stage parameters gain a `namespace` (default `common`), the
//! job's protocol blocks, and for test stages the per-namespace `stage`
//! index. A finalize action always ends the pipeline.

use crate::error::{ParseError, Source};
use lava_actions::{CommandAction, FinalizeAction, BOOT, DEPLOY, TEST};
use lava_core::{
    strategy, ActionTree, CommandRunner, Connector, DeviceConfig, Job, JobEnv, LavaError,
    Parameters, PipelineId, ResultSink, Strategy, Timeout, TimeoutBlock, COMPATIBILITY,
    DEFAULT_NAMESPACE,
};
use lava_protocols::ProtocolSettings;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Read a device configuration
pub fn parse_device(content: &str) -> Result<DeviceConfig, ParseError> {
    serde_yaml::from_str(content).map_err(|error| ParseError::Yaml {
        source_of: Source::Device,
        error,
    })
}

/// Runtime collaborators handed to the parsed job
#[derive(Default, Clone)]
pub struct ParseOptions {
    pub protocols: ProtocolSettings,
    pub tmp_dir: Option<PathBuf>,
    pub runner: Option<Arc<dyn CommandRunner>>,
    pub connector: Option<Arc<dyn Connector>>,
    pub sink: Option<Arc<dyn ResultSink>>,
}

/// Builds a [`Job`] from a job definition and a device
pub struct JobParser<'a> {
    data: &'a Value,
    tree: ActionTree,
    root: PipelineId,
    /// Next test stage index per namespace
    test_counts: BTreeMap<String, u64>,
}

impl<'a> JobParser<'a> {
    /// Parse `content` for `device`
    pub fn parse(
        content: &str,
        device: DeviceConfig,
        job_id: &str,
        options: &ParseOptions,
    ) -> Result<Job, ParseError> {
        let data: Value = serde_yaml::from_str(content).map_err(|error| ParseError::Yaml {
            source_of: Source::Job,
            error,
        })?;
        if !data.is_object() {
            return Err(ParseError::job("the job must be a mapping"));
        }
        check_compatibility(&data)?;

        let timeouts: TimeoutBlock = match data.get("timeouts") {
            Some(block) => serde_json::from_value(block.clone())
                .map_err(|e| ParseError::job(format!("invalid timeouts: {}", e)))?,
            None => TimeoutBlock::default(),
        };
        let device = Arc::new(device);
        let protocols = lava_protocols::select_all(&data, job_id, &options.protocols)?;

        let tree = ActionTree::new(Arc::clone(&device), timeouts.clone());
        let root = tree.root();
        let mut parser = JobParser {
            data: &data,
            tree,
            root,
            test_counts: BTreeMap::new(),
        };
        parser.actions()?;
        parser.tree.push(root, Box::new(FinalizeAction::new()), None)?;
        let tree = parser.tree;

        let mut env = JobEnv::new(job_id, data.clone(), device).with_protocols(protocols);
        if let Some(tmp_dir) = &options.tmp_dir {
            env = env.with_tmp_dir(tmp_dir.join(job_id));
        }
        if let Some(runner) = &options.runner {
            env = env.with_runner(Arc::clone(runner));
        }
        if let Some(connector) = &options.connector {
            env = env.with_connector(Arc::clone(connector));
        }
        if let Some(sink) = &options.sink {
            env = env.with_sink(Arc::clone(sink));
        }

        let mut job = Job::new(env, tree);
        if let Some(duration) = &timeouts.job {
            let name = data
                .get("job_name")
                .and_then(Value::as_str)
                .unwrap_or("job");
            job.timeout = Timeout::new(name, Timeout::parse(duration)?);
        }
        tracing::debug!(job = job_id, timeout = ?job.timeout.duration(), "parsed job");
        Ok(job)
    }

    fn actions(&mut self) -> Result<(), ParseError> {
        let actions = self
            .data
            .get("actions")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::job("missing list of actions"))?;
        for entry in actions {
            let blocks = entry
                .as_object()
                .ok_or_else(|| ParseError::job(format!("action is not a mapping: {}", entry)))?;
            for (name, block) in blocks {
                match name.as_str() {
                    "deploy" | "boot" | "test" => self.stage(name, block)?,
                    "repeat" => self.repeat(block)?,
                    "command" => {
                        self.tree.push(
                            self.root,
                            Box::new(CommandAction::new()),
                            Some(mapping(name, block)?),
                        )?;
                    }
                    other => {
                        return Err(LavaError::job(format!("Unknown action name '{}'", other)).into())
                    }
                }
            }
        }
        Ok(())
    }

    /// `count` iterations of the stage blocks listed under `actions`
    fn repeat(&mut self, block: &Value) -> Result<(), ParseError> {
        let count = block
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ParseError::job("repeat needs a count"))?;
        let blocks = block
            .get("actions")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::job("repeat needs a list of actions"))?;
        for iteration in 0..count {
            for entry in blocks {
                let Some(stages) = entry.as_object() else {
                    return Err(ParseError::job(format!("action is not a mapping: {}", entry)));
                };
                for (name, stage) in stages {
                    let mut stage = stage.clone();
                    if let Some(map) = stage.as_object_mut() {
                        map.insert("repeat-count".to_string(), json!(iteration));
                    }
                    match name.as_str() {
                        "deploy" | "boot" | "test" => self.stage(name, &stage)?,
                        other => {
                            return Err(LavaError::job(format!(
                                "Unknown action name '{}'",
                                other
                            ))
                            .into())
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn stage(&mut self, name: &str, block: &Value) -> Result<(), ParseError> {
        let mut parameters = mapping(name, block)?;
        let namespace = parameters
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string();
        parameters.insert("namespace".to_string(), json!(namespace));
        if let Some(protocols) = self.data.get("protocols").and_then(Value::as_object) {
            for (protocol, settings) in protocols {
                parameters.insert(protocol.clone(), settings.clone());
            }
        }

        let device = self.tree.device_arc();
        match name {
            "deploy" => self.populate("deploy", &DEPLOY, &device, parameters),
            "boot" => self.populate("boot", &BOOT, &device, parameters),
            _ => {
                let count = self.test_counts.entry(namespace).or_insert(0);
                parameters.insert("stage".to_string(), json!(*count));
                *count += 1;
                self.populate("test", &TEST, &device, parameters)
            }
        }
    }

    fn populate<S: Strategy>(
        &mut self,
        stage: &str,
        candidates: &[S],
        device: &DeviceConfig,
        parameters: Parameters,
    ) -> Result<(), ParseError> {
        let chosen = strategy::select(stage, candidates, device, &parameters)?;
        tracing::debug!(stage, strategy = chosen.name(), "populating stage");
        chosen.populate(&mut self.tree, self.root, parameters)?;
        Ok(())
    }
}

fn mapping(name: &str, block: &Value) -> Result<Parameters, ParseError> {
    match block {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Parameters::new()),
        other => Err(ParseError::job(format!(
            "{} block must be a mapping, got {}",
            name, other
        ))),
    }
}

fn check_compatibility(data: &Value) -> Result<(), ParseError> {
    let Some(value) = data.get("compatibility") else {
        return Ok(());
    };
    let required = value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| {
            LavaError::job(format!("invalid compatibility value: {}", value))
        })?;
    if required > COMPATIBILITY {
        return Err(LavaError::job(format!(
            "Dispatcher unable to meet job compatibility requirement. {} > {}",
            COMPATIBILITY, required
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
