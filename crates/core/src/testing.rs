// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable actions and connections for engine tests

use crate::action::{Action, ActionTree, PopulateContext, RunContext};
use crate::connection::{Connection, ExpectMatch};
use crate::device::{DeviceConfig, TimeoutBlock};
use crate::error::LavaError;
use crate::job::JobEnv;
use crate::results::MemorySink;
use crate::timeout::{Timeout, ACTION_TIMEOUT};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn tree() -> ActionTree {
    ActionTree::new(Arc::new(DeviceConfig::default()), TimeoutBlock::default())
}

pub fn env(sink: &MemorySink) -> JobEnv {
    JobEnv::new("1234", json!({}), Arc::new(DeviceConfig::default()))
        .with_sink(Arc::new(sink.clone()))
        .with_retry_sleep(Duration::ZERO)
}

/// Action whose run outcomes are scripted in order; later runs succeed
pub struct StubAction {
    name: String,
    section: Option<String>,
    outcomes: VecDeque<LavaError>,
    runs: Arc<AtomicUsize>,
    cleanups: Arc<AtomicUsize>,
    delay: Option<Duration>,
    opens: Option<String>,
    timeout: Option<Timeout>,
    children: Vec<Box<dyn Action>>,
}

impl StubAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            section: Some("test".to_string()),
            outcomes: VecDeque::new(),
            runs: Arc::default(),
            cleanups: Arc::default(),
            delay: None,
            opens: None,
            timeout: None,
            children: Vec::new(),
        }
    }

    /// Fail the next `times` runs with `error`
    pub fn failing(mut self, times: usize, error: LavaError) -> Self {
        for _ in 0..times {
            self.outcomes.push_back(error.clone());
        }
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn opening(mut self, connection: &str) -> Self {
        self.opens = Some(connection.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_section(mut self) -> Self {
        self.section = None;
        self
    }

    pub fn with_child(mut self, child: Box<dyn Action>) -> Self {
        self.children.push(child);
        self
    }

    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }

    pub fn cleanups(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.cleanups)
    }
}

#[async_trait]
impl Action for StubAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) -> &str {
        "stub action"
    }

    fn description(&self) -> &str {
        "scripted action for tests"
    }

    fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    fn timeout(&self) -> Timeout {
        self.timeout
            .clone()
            .unwrap_or_else(|| Timeout::new(&self.name, ACTION_TIMEOUT))
    }

    fn populate(&mut self, cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
        for child in self.children.drain(..) {
            cx.add_action(child, None)?;
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if cx.child().is_some() {
            cx.run_pipeline(connection).await?;
        }
        if let Some(error) = self.outcomes.pop_front() {
            return Err(error);
        }
        Ok(self
            .opens
            .as_ref()
            .map(|name| Box::new(StubConnection::new(name)) as Box<dyn Connection>))
    }

    async fn cleanup(
        &mut self,
        _cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), LavaError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connection that answers every expect with the first pattern
pub struct StubConnection {
    name: String,
    tags: Vec<String>,
    prompts: Vec<String>,
    timeout: Timeout,
    connected: bool,
}

impl StubConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
            prompts: vec!["# ".to_string()],
            timeout: Timeout::new("connection", ACTION_TIMEOUT),
            connected: true,
        }
    }
}

#[async_trait]
impl Connection for StubConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn prompt_str(&self) -> &[String] {
        &self.prompts
    }

    fn set_prompt_str(&mut self, prompts: Vec<String>) {
        self.prompts = prompts;
    }

    fn timeout(&self) -> &Timeout {
        &self.timeout
    }

    fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }

    fn raw_connection(&self) -> Option<u32> {
        None
    }

    async fn sendline(&mut self, _line: &str, _delay: Duration) -> Result<(), LavaError> {
        Ok(())
    }

    async fn expect(
        &mut self,
        patterns: &[String],
        _timeout: Duration,
    ) -> Result<ExpectMatch, LavaError> {
        Ok(ExpectMatch {
            index: 0,
            matched: patterns.first().cloned().unwrap_or_default(),
            groups: Vec::new(),
        })
    }

    async fn readline(&mut self, _timeout: Duration) -> Result<String, LavaError> {
        Ok(String::new())
    }

    async fn finalise(&mut self) -> Result<(), LavaError> {
        self.connected = false;
        Ok(())
    }
}
