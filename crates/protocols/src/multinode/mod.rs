// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multinode API: message exchange between the sub-jobs of a group

mod collate;
mod sub_id;

pub use collate::collate;
pub use sub_id::{sub_ids, SubId};

use crate::client::PollClient;
use crate::settings::{CoordinatorSettings, ProtocolSettings};
use async_trait::async_trait;
use lava_core::{DeviceConfig, LavaError, Protocol, Timeout, ACTION_TIMEOUT};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const NAME: &str = "lava-multinode";

/// Default bound for group setup and delayed start
pub const LAVA_MULTINODE_SYSTEM_TIMEOUT: Duration = Duration::from_secs(90);

struct Session {
    client: PollClient,
    settings: CoordinatorSettings,
    /// Fields merged into every request; empty until set up
    base: Map<String, Value>,
    poll_timeout: Duration,
    system_timeout: Duration,
}

impl Session {
    async fn send(&mut self, message: Map<String, Value>, system: bool) -> Result<Value, LavaError> {
        if self.base.is_empty() {
            return Err(LavaError::bug(format!("{} protocol used before set up", NAME)));
        }
        let mut full = self.base.clone();
        full.extend(message);
        let timeout = if system {
            self.system_timeout
        } else {
            self.poll_timeout
        };
        tracing::debug!(message = %serde_json::Value::Object(full.clone()), "final message");
        self.client.poll(&Value::Object(full), timeout).await
    }
}

/// Shared access to the multinode session.
///
/// The vland protocol announces and waits for vlans through the same
/// session as the test actions.
#[derive(Clone)]
pub struct MultinodeHandle {
    session: Arc<Mutex<Session>>,
    client_name: String,
    sub_id: u32,
}

impl MultinodeHandle {
    /// Identity of this sub-job on the wire
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn sub_id(&self) -> u32 {
        self.sub_id
    }

    /// Validate an API request, send it and return the reply payload
    pub async fn call(&self, request: &Value) -> Result<Value, LavaError> {
        let data = match request {
            Value::Null => return Err(LavaError::test("Protocol called without any data")),
            Value::Object(map) if map.is_empty() => {
                return Err(LavaError::job(format!(
                    "No data to be sent over protocol {}",
                    NAME
                )))
            }
            Value::Object(map) => map,
            other => {
                return Err(LavaError::job(format!(
                    "Invalid data type {} for protocol {}",
                    other, NAME
                )))
            }
        };
        let request_name = data
            .get("request")
            .and_then(Value::as_str)
            .ok_or_else(|| LavaError::job("Bad API call over protocol - missing request"))?;
        if request_name == "aggregate" {
            return Err(LavaError::job("Pipeline submission has not been implemented."));
        }

        let mut session = self.session.lock().await;
        if let Some(delay) = data.get("poll_delay") {
            let delay = delay
                .as_u64()
                .ok_or_else(|| LavaError::job(format!("Invalid poll_delay {}", delay)))?;
            session.settings.poll_delay = delay;
            session.client.set_poll_delay(Duration::from_secs(delay));
            if !session.base.is_empty() {
                session.base.insert("poll_delay".to_string(), json!(delay));
            }
        }
        if let Some(timeout) = data.get("timeout") {
            session.poll_timeout = match timeout.as_u64() {
                Some(seconds) => Duration::from_secs(seconds),
                None => Timeout::parse(timeout)?,
            };
        }
        let message_id = data
            .get("messageID")
            .and_then(Value::as_str)
            .ok_or_else(|| LavaError::job("Missing messageID"))?;
        let request_name = request_name.replace('-', "_");

        let message = match request_name.as_str() {
            "lava_sync" => {
                tracing::debug!("requesting lava_sync '{}'", message_id);
                json!({"request": "lava_sync", "messageID": message_id})
            }
            "lava_wait" => {
                tracing::debug!("requesting lava_wait '{}'", message_id);
                json!({"request": "lava_wait", "messageID": message_id, "nodeID": self.client_name})
            }
            "lava_wait_all" => match data.get("role").and_then(Value::as_str) {
                Some(role) => {
                    tracing::debug!("requesting lava_wait_all '{}' '{}'", message_id, role);
                    json!({"request": "lava_wait_all", "messageID": message_id, "waitrole": role})
                }
                None => {
                    tracing::debug!("requesting lava_wait_all '{}'", message_id);
                    json!({"request": "lava_wait_all", "messageID": message_id})
                }
            },
            "lava_send" => {
                let payload = send_payload(data.get("message"));
                tracing::debug!("requesting lava_send {} with args {}", message_id, payload);
                json!({"request": "lava_send", "messageID": message_id, "message": payload})
            }
            "lava_start" => {
                let payload = send_payload(data.get("message"));
                tracing::debug!("requesting lava_start with args {}", payload);
                json!({"request": "lava_send", "messageID": "lava_start", "message": payload})
            }
            other => return Err(LavaError::test(format!("Unsupported api call: {}", other))),
        };

        let Value::Object(message) = message else {
            return Err(LavaError::bug("API message is not a mapping"));
        };
        let reply = session.send(message, false).await?;
        Ok(match reply.get("message") {
            Some(message) => message.clone(),
            None => reply.get("response").cloned().unwrap_or(Value::Null),
        })
    }

    async fn send_system(&self, message: Value) -> Result<Value, LavaError> {
        let Value::Object(message) = message else {
            return Err(LavaError::bug("system message is not a mapping"));
        };
        self.session.lock().await.send(message, true).await
    }
}

/// Messages must be mappings; a bare value becomes a key without data
fn send_payload(message: Option<&Value>) -> Value {
    match message {
        None | Some(Value::Null) => json!({}),
        Some(Value::Object(map)) => {
            let mut map = map.clone();
            map.remove("yaml_line");
            Value::Object(map)
        }
        Some(Value::String(key)) => {
            let mut map = Map::new();
            map.insert(key.clone(), Value::Null);
            Value::Object(map)
        }
        Some(other) => {
            let mut map = Map::new();
            map.insert(other.to_string(), Value::Null);
            Value::Object(map)
        }
    }
}

/// The `lava-multinode` protocol of one sub-job
pub struct MultinodeProtocol {
    handle: MultinodeHandle,
    errors: Vec<String>,
    configured: bool,
    target_group: String,
    role: String,
    group_size: u64,
    /// Role whose `lava_start` this job waits for before running
    expect_role: Option<String>,
    hostname: String,
    debug: bool,
}

impl MultinodeProtocol {
    pub fn accepts(parameters: &Value) -> bool {
        parameters
            .get("protocols")
            .and_then(|p| p.get(NAME))
            .and_then(|p| p.get("target_group"))
            .is_some()
    }

    pub fn new(
        parameters: &Value,
        job_id: &str,
        settings: &ProtocolSettings,
    ) -> Result<Self, LavaError> {
        let block = parameters
            .get("protocols")
            .and_then(|p| p.get(NAME))
            .and_then(Value::as_object)
            .ok_or_else(|| LavaError::configuration(format!("Missing {} protocol block", NAME)))?;
        let text = |key: &str| {
            block
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };
        let target_group = text("target_group");
        let role = text("role");
        let group_size = block.get("group_size").and_then(Value::as_u64).unwrap_or(0);
        let sub_id = match block.get("sub_id").and_then(Value::as_u64) {
            Some(index) => u32::try_from(index)
                .map_err(|_| LavaError::job(format!("Invalid sub_id {}", index)))?,
            None => SubId::parse(job_id).map(|id| id.index).unwrap_or(0),
        };

        let mut errors = Vec::new();
        let mut expect_role = None;
        let mut system_timeout = LAVA_MULTINODE_SYSTEM_TIMEOUT;
        let delayed = block.get("request").and_then(Value::as_str) == Some("lava-start");
        if let (true, Some(expected)) = (delayed, block.get("expect_role").and_then(Value::as_str)) {
            if expected == role {
                let error = "expect_role must not match the role declaring lava_start";
                tracing::warn!("{}", error);
                errors.push(error.to_string());
            } else {
                expect_role = Some(expected.to_string());
                if let Some(timeout) = block.get("timeout") {
                    system_timeout = Timeout::parse(timeout)?;
                }
            }
        }

        let coordinator = if settings.debug {
            CoordinatorSettings::debug()
        } else {
            settings.coordinator.clone()
        };
        let client = PollClient::new(
            NAME,
            &coordinator.coordinator_hostname,
            coordinator.port,
            coordinator.poll_delay(),
        );
        Ok(Self {
            handle: MultinodeHandle {
                session: Arc::new(Mutex::new(Session {
                    client,
                    settings: coordinator,
                    base: Map::new(),
                    poll_timeout: ACTION_TIMEOUT,
                    system_timeout,
                })),
                client_name: job_id.to_string(),
                sub_id,
            },
            errors,
            configured: false,
            target_group,
            role,
            group_size,
            expect_role,
            hostname: String::new(),
            debug: settings.debug,
        })
    }

    pub fn handle(&self) -> MultinodeHandle {
        self.handle.clone()
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn delayed_start(&self) -> bool {
        self.expect_role.is_some()
    }

    pub async fn system_timeout(&self) -> Duration {
        self.handle.session.lock().await.system_timeout
    }

    fn base_message(&self, settings: &CoordinatorSettings) -> Map<String, Value> {
        let base = json!({
            "port": settings.port,
            "blocksize": settings.blocksize,
            "poll_delay": settings.poll_delay,
            "host": settings.coordinator_hostname,
            "hostname": self.hostname,
            "client_name": self.handle.client_name,
            "group_name": self.target_group,
            "role": self.role,
        });
        match base {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Prepare the session against the debug port without contacting it
    pub async fn debug_setup(&mut self) {
        let settings = CoordinatorSettings::debug();
        let base = self.base_message(&settings);
        let mut session = self.handle.session.lock().await;
        session.client.retarget(
            &settings.coordinator_hostname,
            settings.port,
            settings.poll_delay(),
        );
        session.settings = settings;
        session.base = base;
        if let Some(role) = &self.expect_role {
            tracing::debug!("Debug: delayed start activated, waiting for {}", role);
        }
        tracing::debug!("{} protocol initialised in debug mode", NAME);
    }

    /// Announce this sub-job and wait until the whole group has joined
    pub async fn initialise_group(&self) -> Result<Value, LavaError> {
        tracing::debug!("Initialising group {}", self.target_group);
        let reply = self
            .handle
            .send_system(json!({"request": "group_data", "group_size": self.group_size}))
            .await?;
        tracing::debug!(roles = %reply.get("roles").unwrap_or(&serde_json::Value::Null), "group complete");
        Ok(reply)
    }
}

#[async_trait]
impl Protocol for MultinodeProtocol {
    fn name(&self) -> &str {
        NAME
    }

    fn level(&self) -> u32 {
        0
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }

    fn configured(&self) -> bool {
        self.configured
    }

    fn configure(&mut self, device: &DeviceConfig, _job_id: &str) -> Result<(), LavaError> {
        self.hostname = device.hostname().to_string();
        self.configured = true;
        Ok(())
    }

    async fn set_up(&mut self) -> Result<(), LavaError> {
        if self.debug {
            self.debug_setup().await;
            return Ok(());
        }
        {
            let mut session = self.handle.session.lock().await;
            let settings = session.settings.clone();
            session.base = self.base_message(&settings);
        }
        self.initialise_group().await?;

        let Some(expect_role) = self.expect_role.clone() else {
            tracing::debug!("{} protocol initialised", NAME);
            return Ok(());
        };
        let timeout = self.system_timeout().await;
        tracing::info!(
            "{} protocol initialised - start is delayed by up to {} seconds",
            NAME,
            timeout.as_secs()
        );
        tracing::debug!(
            "Delaying start for {} seconds, lava_wait_all for role {}",
            timeout.as_secs(),
            expect_role
        );
        self.handle
            .send_system(json!({
                "request": "lava_wait_all",
                "waitrole": expect_role,
                "messageID": "lava_start",
            }))
            .await?;
        Ok(())
    }

    async fn call(&mut self, request: &Value) -> Result<Value, LavaError> {
        self.handle.call(request).await
    }

    fn collate(&self, reply: &Value, request: &Value) -> Result<Option<(String, Value)>, LavaError> {
        collate(reply, request, &self.handle.client_name)
    }

    async fn reset(&mut self) {
        self.handle.session.lock().await.client.reset();
    }

    async fn finalise_protocol(&mut self, _device: &DeviceConfig) -> Result<(), LavaError> {
        if self.handle.session.lock().await.base.is_empty() {
            return Ok(());
        }
        let result = self
            .handle
            .send_system(json!({"request": "clear_group", "group_size": self.group_size}))
            .await;
        self.handle.session.lock().await.client.close().await;
        tracing::debug!("{} protocol finalised.", NAME);
        result.map(|_| ())
    }

    fn describe(&self) -> Value {
        json!({
            "name": NAME,
            "role": self.role,
            "target_group": self.target_group,
            "group_size": self.group_size,
            "sub_id": self.handle.sub_id,
        })
    }
}

#[cfg(test)]
#[path = "multinode_tests.rs"]
mod tests;
