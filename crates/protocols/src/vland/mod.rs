// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VLANd protocol: per-group vlans bound to tagged device interfaces
//!
//! Runs after multinode is set up. The first sub-job of the group creates
//! each vlan and announces it; the others wait for the announcement. Every
//! sub-job then moves its own switch port onto the vlan.

mod api;

use crate::multinode::{self, MultinodeHandle};
use crate::settings::ProtocolSettings;
use api::VlandApi;
use async_trait::async_trait;
use lava_core::{DeviceConfig, LavaError, Protocol};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const NAME: &str = "lava-vland";

/// Smallest connection timeout allowed for `deploy_vlans`
pub const VLAND_DEPLOY_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct Interface {
    switch: String,
    port: Value,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Interface chosen for one vlan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VlanBinding {
    pub iface: String,
    pub switch: String,
    pub port: Value,
}

/// Switch-safe vlan name: last 8 characters of the job id followed by the
/// first 8 of the friendly name, alphanumeric only
pub fn vlan_name(job_id: &str, friendly_name: &str) -> String {
    let skip = job_id.chars().count().saturating_sub(8);
    job_id
        .chars()
        .skip(skip)
        .chain(friendly_name.chars().take(8))
        .filter(|c| c.is_alphanumeric())
        .take(16)
        .collect()
}

pub struct VlandProtocol {
    multinode: Option<MultinodeHandle>,
    api: VlandApi,
    errors: Vec<String>,
    configured: bool,
    /// friendly name to requested tags; `None` when the block gave no tags
    requested: BTreeMap<String, Option<Vec<String>>>,
    names: BTreeMap<String, String>,
    bindings: BTreeMap<String, VlanBinding>,
    /// friendly name to VLANd vlan id, filled by `deploy_vlans`
    vlans: BTreeMap<String, Value>,
    ports: Vec<Value>,
}

impl VlandProtocol {
    pub fn accepts(parameters: &Value) -> bool {
        multinode::MultinodeProtocol::accepts(parameters)
            && parameters
                .get("protocols")
                .and_then(|p| p.get(NAME))
                .is_some()
    }

    pub fn new(
        parameters: &Value,
        job_id: &str,
        settings: &ProtocolSettings,
        multinode: Option<MultinodeHandle>,
    ) -> Result<Self, LavaError> {
        let block = parameters
            .get("protocols")
            .and_then(|p| p.get(NAME))
            .and_then(Value::as_object)
            .ok_or_else(|| LavaError::configuration(format!("Missing {} protocol block", NAME)))?;
        let mut requested = BTreeMap::new();
        let mut names = BTreeMap::new();
        for (friendly_name, vlan) in block.iter().filter(|(key, _)| key.as_str() != "yaml_line") {
            let tags = match vlan.get("tags") {
                Some(tags) => Some(serde_json::from_value::<Vec<String>>(tags.clone()).map_err(
                    |e| LavaError::job(format!("Invalid tags for vlan {}: {}", friendly_name, e)),
                )?),
                None => None,
            };
            requested.insert(friendly_name.clone(), tags);
            names.insert(friendly_name.clone(), vlan_name(job_id, friendly_name));
        }
        Ok(Self {
            multinode,
            api: VlandApi::new(&settings.vland),
            errors: Vec::new(),
            configured: false,
            requested,
            names,
            bindings: BTreeMap::new(),
            vlans: BTreeMap::new(),
            ports: Vec::new(),
        })
    }

    /// VLANd names by friendly name
    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    /// Interface bound to each vlan during configure
    pub fn bindings(&self) -> &BTreeMap<String, VlanBinding> {
        &self.bindings
    }

    fn interfaces(&mut self, device: &DeviceConfig) -> Option<Vec<(String, Interface)>> {
        if device.parameters.is_null() {
            self.errors
                .push("Invalid device configuration, no parameters given.".to_string());
            return None;
        }
        let Some(interfaces) = device.parameters.get("interfaces") else {
            self.errors.push("Device lacks interfaces information.".to_string());
            return None;
        };
        let Some(interfaces) = interfaces.as_object() else {
            self.errors
                .push("Invalid interfaces dictionary for device".to_string());
            return None;
        };
        let mut parsed = Vec::new();
        for (name, interface) in interfaces {
            match serde_json::from_value::<Interface>(interface.clone()) {
                Ok(interface) => parsed.push((name.clone(), interface)),
                Err(e) => {
                    self.errors
                        .push(format!("Invalid interface {} for device: {}", name, e));
                    return None;
                }
            }
        }
        Some(parsed)
    }

    fn multinode(&self) -> Result<&MultinodeHandle, LavaError> {
        self.multinode
            .as_ref()
            .ok_or_else(|| LavaError::job("Unable to determine Multinode protocol object"))
    }

    async fn deploy_vlans(&mut self) -> Result<(), LavaError> {
        let multinode = self.multinode()?.clone();
        let announce = VLAND_DEPLOY_TIMEOUT.as_secs();
        tracing::debug!(timeout_secs = self.api.timeout().as_secs(), "deploying vlans");
        if multinode.sub_id() == 0 {
            for (friendly_name, name) in &self.names {
                tracing::info!("Deploying vlan {} : {}", friendly_name, name);
                let (vlan_id, tag) = self.api.create_vlan(name).await?;
                tracing::debug!("vlan name: {} vlan tag: {}", vlan_id, tag);
                self.vlans.insert(friendly_name.clone(), vlan_id.clone());
                multinode
                    .call(&json!({
                        "request": "lava_send",
                        "timeout": announce,
                        "messageID": friendly_name,
                        "message": {"vlan_name": vlan_id, "vlan_tag": tag},
                    }))
                    .await?;
            }
        } else {
            for (friendly_name, name) in &self.names {
                tracing::info!("Waiting for vlan {} : {} to be deployed.", friendly_name, name);
                let reply = multinode
                    .call(&json!({
                        "request": "lava_wait",
                        "timeout": announce,
                        "messageID": friendly_name,
                    }))
                    .await?;
                let created = reply
                    .as_object()
                    .and_then(|senders| senders.values().next())
                    .filter(|data| data.get("vlan_name").is_some())
                    .ok_or_else(|| {
                        LavaError::job(format!("Waiting for vlan creation failed: {}", reply))
                    })?;
                tracing::debug!(
                    "vlan name: {} vlan tag: {}",
                    created["vlan_name"],
                    created.get("vlan_tag").unwrap_or(&serde_json::Value::Null)
                );
                self.vlans
                    .insert(friendly_name.clone(), created["vlan_name"].clone());
            }
        }

        for (friendly_name, vlan_id) in &self.vlans {
            let binding = self.bindings.get(friendly_name).ok_or_else(|| {
                LavaError::configuration(format!("No interface bound to vlan {}", friendly_name))
            })?;
            let switch_id = self.api.lookup_switch_id(&binding.switch).await?;
            let port_id = self.api.lookup_port_id(&switch_id, &binding.port).await?;
            tracing::info!(
                "Setting switch {} port {} to vlan {} on {}",
                binding.switch,
                binding.port,
                friendly_name,
                binding.iface
            );
            self.api.set_port_onto_vlan(vlan_id, &port_id).await?;
            self.ports.push(port_id);
        }
        Ok(())
    }
}

/// Checked before parsing a request
fn request_name(request: &Value) -> Result<&str, LavaError> {
    if request.is_null() || request.as_object().is_some_and(|map| map.is_empty()) {
        return Err(LavaError::test("Protocol called without any data"));
    }
    request
        .get("request")
        .and_then(Value::as_str)
        .ok_or_else(|| LavaError::job("Bad API call over protocol - missing request"))
}

#[async_trait]
impl Protocol for VlandProtocol {
    fn name(&self) -> &str {
        NAME
    }

    fn level(&self) -> u32 {
        5
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }

    fn configured(&self) -> bool {
        self.configured
    }

    fn configure(&mut self, device: &DeviceConfig, _job_id: &str) -> Result<(), LavaError> {
        if self.configured {
            return Ok(());
        }
        if self.multinode.is_none() {
            self.errors
                .push("Unable to determine Multinode protocol object".to_string());
        }
        let Some(interfaces) = self.interfaces(device) else {
            return Ok(());
        };

        // primary interfaces carry no tags and never join a vlan
        let available: BTreeSet<&String> = interfaces
            .iter()
            .filter_map(|(_, interface)| interface.tags.as_ref())
            .flatten()
            .collect();
        let mut wanted = Vec::new();
        for (friendly_name, tags) in &self.requested {
            match tags {
                Some(tags) => wanted.extend(tags.iter()),
                None => self.errors.push(format!(
                    "vlan {} on {} does not request any tags for {}",
                    friendly_name,
                    device.hostname(),
                    NAME
                )),
            }
        }
        if !wanted.iter().all(|tag| available.contains(tag)) {
            self.errors.push(format!(
                "Requested link speeds {:?} are not available {:?} for {}",
                wanted,
                available,
                device.hostname()
            ));
        }
        if !self.valid() {
            return Ok(());
        }

        // one vlan per switch and port, on any interface supporting every requested tag
        let mut seen = BTreeSet::new();
        for (friendly_name, tags) in &self.requested {
            let tags = tags.as_deref().unwrap_or_default();
            for (iface, interface) in &interfaces {
                let Some(supported) = &interface.tags else {
                    continue;
                };
                let node = format!("{} {}", interface.switch, interface.port);
                if seen.contains(&node) || !tags.iter().all(|tag| supported.contains(tag)) {
                    continue;
                }
                self.bindings.insert(
                    friendly_name.clone(),
                    VlanBinding {
                        iface: iface.clone(),
                        switch: interface.switch.clone(),
                        port: interface.port.clone(),
                    },
                );
                seen.insert(node);
                break;
            }
        }

        match self.multinode.as_ref().map(MultinodeHandle::sub_id) {
            Some(0) => tracing::info!("[{}] Job will deploy requested VLANs.", NAME),
            _ => tracing::info!("[{}] Job will wait for VLANs to be deployed.", NAME),
        }
        tracing::debug!("[{}] bindings: {:?}", NAME, self.bindings);
        self.api.set_client_name(device.hostname());
        self.configured = true;
        Ok(())
    }

    async fn call(&mut self, request: &Value) -> Result<Value, LavaError> {
        match request_name(request)? {
            "deploy_vlans" => {
                self.deploy_vlans().await?;
                Ok(Value::Null)
            }
            _ => Err(LavaError::job("Unrecognised API call in request.")),
        }
    }

    fn check_timeout(&mut self, duration: Duration, request: &Value) -> Result<(), LavaError> {
        if request_name(request)? != "deploy_vlans" {
            return Ok(());
        }
        if duration < VLAND_DEPLOY_TIMEOUT {
            return Err(LavaError::job(format!(
                "Timeout of {} is insufficient for deploy_vlans",
                duration.as_secs()
            )));
        }
        tracing::info!("Setting vland base timeout to {} seconds", duration.as_secs());
        self.api.set_timeout(duration);
        Ok(())
    }

    async fn reset(&mut self) {
        self.api.reset();
    }

    async fn finalise_protocol(&mut self, _device: &DeviceConfig) -> Result<(), LavaError> {
        let mut result = Ok(());
        for port_id in std::mem::take(&mut self.ports) {
            tracing::info!("Finalizing port {}", port_id);
            if let Err(e) = self.api.restore_port(&port_id).await {
                tracing::error!("Unable to restore port {}: {}", port_id, e);
                result = result.and(Err(e));
            }
        }
        for (friendly_name, vlan_id) in std::mem::take(&mut self.vlans) {
            tracing::info!("Finalizing vlan {} ({})", vlan_id, friendly_name);
            if let Err(e) = self.api.delete_vlan(&vlan_id).await {
                tracing::error!("Unable to delete vlan {}: {}", vlan_id, e);
                result = result.and(Err(e));
            }
        }
        self.api.close().await;
        result
    }

    fn describe(&self) -> Value {
        json!({
            "name": NAME,
            "vlans": self.names,
        })
    }

    /// `{"names": {friendly: vland name}, "bindings": {friendly: {iface, switch, port}}}`
    fn data(&self) -> Value {
        json!({
            "names": self.names,
            "bindings": self.bindings,
        })
    }
}

#[cfg(test)]
#[path = "vland_tests.rs"]
mod tests;
