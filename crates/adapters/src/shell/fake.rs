// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted connections for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::ConnectionError;
use crate::expect::{ExpectBuffer, Patterns};
use async_trait::async_trait;
use lava_core::{Connection, Connector, ExpectMatch, LavaError, Timeout, ACTION_TIMEOUT};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Recorded connection call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCall {
    Sendline(String),
    Expect(Vec<String>),
    Readline,
    Finalise,
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<String>,
    replies: Vec<(String, String)>,
    buffer: ExpectBuffer,
    calls: Vec<ConnectionCall>,
    closes: bool,
    finalised: bool,
}

/// Connection that replays scripted output.
///
/// Clones share the script and the call log, so a test can keep a handle
/// after the connection has been boxed and handed to an action.
#[derive(Clone)]
pub struct FakeConnection {
    name: String,
    tags: Vec<String>,
    prompts: Vec<String>,
    timeout: Timeout,
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
            prompts: Vec::new(),
            timeout: Timeout::new(name, ACTION_TIMEOUT),
            state: Arc::default(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Queue a chunk of output
    pub fn output(self, chunk: &str) -> Self {
        self.lock().script.push_back(chunk.to_string());
        self
    }

    /// Emit `output` the first time a sent line contains `trigger`
    pub fn reply(self, trigger: &str, output: &str) -> Self {
        self.lock()
            .replies
            .push((trigger.to_string(), output.to_string()));
        self
    }

    /// Report EOF once the script runs out, instead of a timeout
    pub fn closes(self) -> Self {
        self.lock().closes = true;
        self
    }

    pub fn calls(&self) -> Vec<ConnectionCall> {
        self.lock().calls.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ConnectionCall::Sendline(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_finalised(&self) -> bool {
        self.lock().finalised
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn exhausted(&self, state: &FakeState, timeout: Duration) -> ConnectionError {
        if state.closes {
            ConnectionError::Closed
        } else {
            ConnectionError::TimedOut {
                name: self.timeout.name().to_string(),
                seconds: timeout.as_secs(),
            }
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn connected(&self) -> bool {
        !self.lock().finalised
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

    async fn sendline(&mut self, line: &str, _delay: Duration) -> Result<(), LavaError> {
        let mut state = self.lock();
        state.calls.push(ConnectionCall::Sendline(line.to_string()));
        if let Some(pos) = state.replies.iter().position(|(t, _)| line.contains(t.as_str())) {
            let (_, output) = state.replies.remove(pos);
            state.script.push_back(output);
        }
        Ok(())
    }

    async fn expect(
        &mut self,
        patterns: &[String],
        timeout: Duration,
    ) -> Result<ExpectMatch, LavaError> {
        let compiled = Patterns::compile(patterns)?;
        let mut state = self.lock();
        state.calls.push(ConnectionCall::Expect(patterns.to_vec()));
        loop {
            if let Some(found) = state.buffer.take_match(&compiled) {
                return Ok(found);
            }
            match state.script.pop_front() {
                Some(chunk) => state.buffer.push_str(&chunk),
                None => return Err(self.exhausted(&state, timeout).into()),
            }
        }
    }

    async fn readline(&mut self, timeout: Duration) -> Result<String, LavaError> {
        let mut state = self.lock();
        state.calls.push(ConnectionCall::Readline);
        loop {
            if let Some(line) = state.buffer.take_line() {
                return Ok(line);
            }
            match state.script.pop_front() {
                Some(chunk) => state.buffer.push_str(&chunk),
                None => return Err(self.exhausted(&state, timeout).into()),
            }
        }
    }

    async fn finalise(&mut self) -> Result<(), LavaError> {
        let mut state = self.lock();
        state.calls.push(ConnectionCall::Finalise);
        state.finalised = true;
        Ok(())
    }
}

/// Connector handing out prepared fake connections in order
#[derive(Clone, Default)]
pub struct FakeConnector {
    prepared: Arc<Mutex<VecDeque<FakeConnection>>>,
    connects: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(self, connection: FakeConnection) -> Self {
        self.prepared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(connection);
        self
    }

    /// `(name, command)` of every connect call
    pub fn connects(&self) -> Vec<(String, String)> {
        self.connects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, name: &str, command: &str) -> Result<Box<dyn Connection>, LavaError> {
        self.connects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), command.to_string()));
        let prepared = self
            .prepared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(Box::new(prepared.unwrap_or_else(|| FakeConnection::new(name))))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
