// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed VLANd API calls over the framed polling client

use crate::client::PollClient;
use crate::settings::VlandSettings;
use lava_core::{LavaError, ACTION_TIMEOUT};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub(crate) struct VlandApi {
    client: PollClient,
    settings: VlandSettings,
    base: Map<String, Value>,
    timeout: Duration,
}

impl VlandApi {
    pub(crate) fn new(settings: &VlandSettings) -> Self {
        Self {
            client: PollClient::new(
                super::NAME,
                &settings.vland_hostname,
                settings.port,
                settings.poll_delay(),
            ),
            settings: settings.clone(),
            base: Map::new(),
            timeout: ACTION_TIMEOUT,
        }
    }

    /// Identify this dispatcher in every request
    pub(crate) fn set_client_name(&mut self, client_name: &str) {
        let base = json!({
            "port": self.settings.port,
            "poll_delay": self.settings.poll_delay,
            "host": self.settings.vland_hostname,
            "client_name": client_name,
        });
        if let Value::Object(base) = base {
            self.base = base;
        }
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn reset(&mut self) {
        self.client.reset();
    }

    pub(crate) async fn close(&mut self) {
        self.client.close().await;
    }

    async fn request(&mut self, kind: &str, command: &str, data: Value) -> Result<Value, LavaError> {
        let mut message = self.base.clone();
        message.insert("type".to_string(), json!(kind));
        message.insert("command".to_string(), json!(command));
        message.insert("data".to_string(), data);
        tracing::debug!(command, message = %serde_json::Value::Object(message.clone()), "vland request");
        self.client.poll(&Value::Object(message), self.timeout).await
    }

    /// Create a vlan with the next free tag, returning `(vlan_id, tag)`
    pub(crate) async fn create_vlan(&mut self, name: &str) -> Result<(Value, Value), LavaError> {
        let reply = self
            .request(
                "vlan_update",
                "api.create_vlan",
                json!({"name": name, "tag": -1, "is_base_vlan": false}),
            )
            .await?;
        match reply.get("data").and_then(Value::as_array).map(Vec::as_slice) {
            Some([vlan_id, tag]) if !tag.is_null() => Ok((vlan_id.clone(), tag.clone())),
            _ => Err(LavaError::job(format!(
                "Deploy vlans failed for {}: {}",
                name, reply
            ))),
        }
    }

    pub(crate) async fn delete_vlan(&mut self, vlan_id: &Value) -> Result<(), LavaError> {
        self.request("vlan_update", "api.delete_vlan", json!({"vlan_id": vlan_id}))
            .await
            .map(|_| ())
    }

    pub(crate) async fn lookup_switch_id(&mut self, switch: &str) -> Result<Value, LavaError> {
        let reply = self
            .request("db_query", "db.get_switch_id_by_name", json!({"name": switch}))
            .await?;
        data(reply).ok_or_else(|| {
            LavaError::job(format!("Switch_id for switch name: {} not found", switch))
        })
    }

    pub(crate) async fn lookup_port_id(
        &mut self,
        switch_id: &Value,
        port: &Value,
    ) -> Result<Value, LavaError> {
        let reply = self
            .request(
                "db_query",
                "db.get_port_by_switch_and_number",
                json!({"switch_id": switch_id, "number": port}),
            )
            .await?;
        data(reply).ok_or_else(|| LavaError::job(format!("Port_id for port: {} not found", port)))
    }

    pub(crate) async fn set_port_onto_vlan(
        &mut self,
        vlan_id: &Value,
        port_id: &Value,
    ) -> Result<(), LavaError> {
        self.request(
            "vlan_update",
            "api.set_current_vlan",
            json!({"port_id": port_id, "vlan_id": vlan_id}),
        )
        .await
        .map(|_| ())
    }

    pub(crate) async fn restore_port(&mut self, port_id: &Value) -> Result<(), LavaError> {
        self.request("vlan_update", "api.restore_base_vlan", json!({"port_id": port_id}))
            .await
            .map(|_| ())
    }
}

fn data(reply: Value) -> Option<Value> {
    match reply.get("data") {
        None | Some(Value::Null) => None,
        Some(data) => Some(data.clone()),
    }
}
