// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for running actions against fakes

use lava_adapters::{FakeConnection, FakeConnector, FakeRunner};
use lava_core::{
    pipeline, Action, ActionId, ActionTree, Connection, DeviceConfig, JobEnv, LavaError,
    MemorySink, Parameters, ProtocolSet, TimeoutBlock,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn device(config: Value) -> DeviceConfig {
    serde_json::from_value(config).unwrap()
}

pub(crate) fn params(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        other => panic!("parameters must be a mapping, got {}", other),
    }
}

/// A one-pipeline job built from hand-picked actions
pub(crate) struct Harness {
    pub tree: ActionTree,
    pub env: JobEnv,
    pub sink: MemorySink,
    pub runner: FakeRunner,
    pub connector: FakeConnector,
    pub connection: Option<Box<dyn Connection>>,
    _tmp: tempfile::TempDir,
}

impl Harness {
    pub fn new(device: DeviceConfig) -> Self {
        Self::with_job(device, json!({}))
    }

    pub fn with_job(device: DeviceConfig, job: Value) -> Self {
        let device = Arc::new(device);
        let sink = MemorySink::new();
        let runner = FakeRunner::new();
        let connector = FakeConnector::new();
        let tmp = tempfile::tempdir().unwrap();
        let env = JobEnv::new("4212", job, Arc::clone(&device))
            .with_sink(Arc::new(sink.clone()))
            .with_runner(Arc::new(runner.clone()))
            .with_connector(Arc::new(connector.clone()))
            .with_tmp_dir(tmp.path())
            .with_retry_sleep(Duration::ZERO);
        Self {
            tree: ActionTree::new(device, TimeoutBlock::default()),
            env,
            sink,
            runner,
            connector,
            connection: None,
            _tmp: tmp,
        }
    }

    pub fn runner(mut self, runner: FakeRunner) -> Self {
        self.env = self.env.with_runner(Arc::new(runner.clone()));
        self.runner = runner;
        self
    }

    pub fn connector(mut self, connector: FakeConnector) -> Self {
        self.env = self.env.with_connector(Arc::new(connector.clone()));
        self.connector = connector;
        self
    }

    pub fn protocols(mut self, protocols: ProtocolSet) -> Self {
        self.env.protocols = protocols;
        self
    }

    pub fn connected(mut self, connection: FakeConnection) -> Self {
        self.connection = Some(Box::new(connection));
        self
    }

    pub fn push(&mut self, action: Box<dyn Action>, parameters: Value) -> ActionId {
        let root = self.tree.root();
        self.tree.push(root, action, Some(params(parameters))).unwrap()
    }

    pub fn validate(&mut self) -> Result<(), LavaError> {
        let root = self.tree.root();
        pipeline::validate_actions(&mut self.tree, &self.env, root)
    }

    pub async fn run(&mut self) -> Result<(), LavaError> {
        let root = self.tree.root();
        pipeline::run_actions(&mut self.tree, &mut self.env, root, &mut self.connection, None).await
    }

    pub async fn cleanup(&mut self) {
        let root = self.tree.root();
        pipeline::cleanup(&mut self.tree, &mut self.env, root, &mut self.connection).await;
    }

    pub fn errors(&self) -> Vec<String> {
        self.tree.errors(self.tree.root())
    }

    /// Records emitted for test cases, skipping action result records
    pub fn cases(&self) -> Vec<Value> {
        self.sink
            .records()
            .into_iter()
            .filter(|r| r.get("level").is_none())
            .collect()
    }
}
