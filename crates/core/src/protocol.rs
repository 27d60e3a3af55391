// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-job coordination channels attached to a job

use crate::device::DeviceConfig;
use crate::error::LavaError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// A coordination channel consulted by actions at defined points.
///
/// Protocols are configured during validation, set up when the job starts,
/// called by actions through [`crate::RunContext::call_protocols`] and
/// finalised by the finalize action.
#[async_trait]
pub trait Protocol: Send {
    fn name(&self) -> &str;

    /// Lower levels are set up and finalised first
    fn level(&self) -> u32;

    fn errors(&self) -> &[String];

    fn valid(&self) -> bool {
        self.errors().is_empty()
    }

    fn configured(&self) -> bool {
        true
    }

    /// Check the protocol against the device before the job runs
    fn configure(&mut self, _device: &DeviceConfig, _job_id: &str) -> Result<(), LavaError> {
        Ok(())
    }

    async fn set_up(&mut self) -> Result<(), LavaError> {
        Ok(())
    }

    /// Send one request and return the reply
    async fn call(&mut self, request: &Value) -> Result<Value, LavaError>;

    /// Reject a request whose connection timeout is too short for it
    fn check_timeout(&mut self, _duration: Duration, _request: &Value) -> Result<(), LavaError> {
        Ok(())
    }

    /// Resolve a reply against the request into a `(key, value)` to store
    fn collate(&self, _reply: &Value, _request: &Value) -> Result<Option<(String, Value)>, LavaError> {
        Ok(None)
    }

    /// Drop a faulted connection so the next call reconnects.
    ///
    /// Called by retry wrappers between attempts.
    async fn reset(&mut self) {}

    async fn finalise_protocol(&mut self, _device: &DeviceConfig) -> Result<(), LavaError> {
        Ok(())
    }

    /// Stable fields for the job description
    fn describe(&self) -> Value {
        Value::Null
    }

    /// Data resolved by `configure` for actions to read
    fn data(&self) -> Value {
        Value::Null
    }
}

/// Protocols of one job, kept sorted by level
#[derive(Default)]
pub struct ProtocolSet {
    protocols: Vec<Box<dyn Protocol>>,
}

impl ProtocolSet {
    pub fn new(mut protocols: Vec<Box<dyn Protocol>>) -> Self {
        protocols.sort_by_key(|p| p.level());
        Self { protocols }
    }

    pub fn push(&mut self, protocol: Box<dyn Protocol>) {
        self.protocols.push(protocol);
        self.protocols.sort_by_key(|p| p.level());
    }

    pub fn get(&self, name: &str) -> Option<&dyn Protocol> {
        self.protocols
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Protocol>> {
        self.protocols.iter_mut().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn Protocol>> {
        self.protocols.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Protocol>> {
        self.protocols.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.protocols.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Reset every protocol at a retry boundary
    pub async fn reset(&mut self) {
        for protocol in &mut self.protocols {
            protocol.reset().await;
        }
    }
}

impl std::fmt::Debug for ProtocolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
