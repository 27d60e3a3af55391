// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group state and the request handlers of the coordinator.
//!
//! Every request names its group and client. Groups register themselves on
//! the first request carrying a `group_size`; clients join their group on
//! every request. Handlers answer `wait` until the condition a client
//! polls for holds, then `ack` with any message data.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

fn ack() -> Value {
    json!({"response": "ack"})
}

fn nack() -> Value {
    json!({"response": "nack"})
}

fn wait() -> Value {
    json!({"response": "wait"})
}

fn ack_with(message: &Value) -> Value {
    json!({"response": "ack", "message": message})
}

/// Senders of one messageID, for `lava_wait_all`
#[derive(Debug, Default)]
struct Waits {
    senders: BTreeSet<String>,
    /// sender → payload
    data: Map<String, Value>,
}

/// One multinode group
#[derive(Debug, Default)]
pub struct Group {
    size: usize,
    /// Clients that sent `clear_group`
    complete: usize,
    /// client_name → hostname
    clients: BTreeMap<String, String>,
    /// role → client names, in joining order
    roles: BTreeMap<String, Vec<String>>,
    /// client → messageID → message
    messages: BTreeMap<String, BTreeMap<String, Value>>,
    waits: BTreeMap<String, Waits>,
    /// messageID → client → still polling
    syncs: BTreeMap<String, BTreeMap<String, bool>>,
}

impl Group {
    fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn clients(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    fn join(&mut self, client: &str, hostname: &str, role: &str) {
        if self.clients.contains_key(client) {
            return;
        }
        self.clients.insert(client.to_string(), hostname.to_string());
        self.roles
            .entry(role.to_string())
            .or_default()
            .push(client.to_string());
    }

    /// Roles of every client once the whole group has joined
    fn group_data(&self, group: &str) -> Value {
        if self.clients.len() != self.size {
            tracing::info!(
                "Waiting for {} more clients to connect to {} group",
                self.size.saturating_sub(self.clients.len()),
                group
            );
            return wait();
        }
        tracing::info!("Group complete, starting tests");
        let roles: Map<String, Value> = self
            .roles
            .iter()
            .flat_map(|(role, clients)| clients.iter().map(move |c| (c.clone(), json!(role))))
            .collect();
        json!({"response": "group_data", "roles": roles})
    }

    /// Store the message for every client and record the sender for wait-all
    fn send(&mut self, client: &str, message_id: &str, request: &Value) -> Value {
        let payload = match request.get("message") {
            None | Some(Value::Null) => json!({}),
            Some(message) => message.clone(),
        };
        tracing::info!("lava_send of '{}' from {}", message_id, client);

        for recipient in self.clients.keys() {
            let stored = self
                .messages
                .entry(recipient.clone())
                .or_default()
                .entry(message_id.to_string())
                .or_insert_with(|| json!({}));
            // a sync on the same messageID leaves a bare value behind
            if !stored.is_object() {
                *stored = json!({});
            }
            if let Some(map) = stored.as_object_mut() {
                map.insert(client.to_string(), payload.clone());
            }
        }

        let waits = self.waits.entry(message_id.to_string()).or_default();
        waits.senders.insert(client.to_string());
        waits.data.insert(client.to_string(), payload);
        ack()
    }

    /// Message data once any client has sent `message_id`
    fn wait(&self, client: &str, message_id: &str) -> Value {
        match self.messages.get(client).and_then(|m| m.get(message_id)) {
            Some(message) => {
                tracing::info!("Sending messageID '{}' to {}", message_id, client);
                ack_with(message)
            }
            None => {
                tracing::debug!("MessageID {} not yet seen for {}", message_id, client);
                wait()
            }
        }
    }

    /// Sender data once every client, or every client of `waitrole`, sent
    fn wait_all(&self, client: &str, message_id: &str, request: &Value) -> Value {
        let expected: Vec<&String> = match request.get("waitrole").and_then(Value::as_str) {
            Some(role) => match self.roles.get(role) {
                Some(clients) => clients.iter().collect(),
                None => {
                    tracing::warn!("lava_wait_all from {} for unknown role {}", client, role);
                    return nack();
                }
            },
            None => self.clients.keys().collect(),
        };
        let Some(waits) = self.waits.get(message_id) else {
            tracing::debug!("messageID {} not yet seen", message_id);
            return wait();
        };
        if let Some(missing) = expected.iter().find(|c| !waits.senders.contains(c.as_str())) {
            tracing::debug!("{} still waiting for {} to send {}", client, missing, message_id);
            return wait();
        }
        ack_with(&Value::Object(waits.data.clone()))
    }

    /// Barrier across the whole group; a messageID can be synced again
    /// once every client has picked up the reply
    fn sync(&mut self, client: &str, message_id: &str, request: &Value) -> Value {
        let message = match request.get("message") {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
            Some(Value::String(text)) if !text.is_empty() => json!(text),
            _ => json!(message_id),
        };
        self.messages
            .entry(client.to_string())
            .or_default()
            .insert(message_id.to_string(), message.clone());

        let syncs = self.syncs.entry(message_id.to_string()).or_default();
        if syncs.len() < self.size {
            tracing::info!(
                "waiting for '{}': not all clients have synced yet {} < {}",
                message_id,
                syncs.len(),
                self.size
            );
            syncs.insert(client.to_string(), true);
            return wait();
        }
        syncs.insert(client.to_string(), false);
        if syncs.values().all(|pending| !pending) {
            tracing::debug!("Clearing all sync messages for '{}'", message_id);
            syncs.clear();
        }
        ack_with(&message)
    }
}

/// Every group the coordinator knows about
#[derive(Debug, Default)]
pub struct Coordinator {
    groups: BTreeMap<String, Group>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Answer one request
    pub fn handle(&mut self, request: &Value) -> Value {
        let Some(kind) = request.get("request").and_then(Value::as_str) else {
            tracing::warn!(%request, "request without a name");
            return nack();
        };
        let (group_name, client) = match self.register(request) {
            Ok(names) => names,
            Err(reason) => {
                tracing::warn!(%request, "{}", reason);
                return nack();
            }
        };
        if kind == "clear_group" {
            return self.clear_group(&group_name);
        }
        let Some(group) = self.groups.get_mut(&group_name) else {
            return nack();
        };
        let message_id = request.get("messageID").and_then(Value::as_str);
        match (kind, message_id) {
            ("group_data", _) => group.group_data(&group_name),
            ("complete", _) => {
                tracing::info!(
                    "coordinator communication for '{}' in group '{}' is complete",
                    client,
                    group_name
                );
                ack()
            }
            ("lava_send", Some(id)) => group.send(&client, id, request),
            ("lava_wait", Some(id)) => group.wait(&client, id),
            ("lava_wait_all", Some(id)) => group.wait_all(&client, id, request),
            ("lava_sync", Some(id)) => group.sync(&client, id, request),
            ("lava_send" | "lava_wait" | "lava_wait_all" | "lava_sync", None) => {
                tracing::error!(%request, "No 'messageID' key found in request");
                nack()
            }
            (other, _) => {
                tracing::error!("Unrecognised request {}", other);
                nack()
            }
        }
    }

    /// Register the group and client named by `request`
    fn register(&mut self, request: &Value) -> Result<(String, String), String> {
        let text = |key: &str| request.get(key).and_then(Value::as_str);
        let client = text("client_name").ok_or("Missing client_name in request")?;
        let group_name = text("group_name").ok_or("Missing group_name in request")?;
        if !self.groups.contains_key(group_name) {
            let size = request
                .get("group_size")
                .and_then(Value::as_u64)
                .filter(|size| *size > 0)
                .ok_or_else(|| {
                    format!(
                        "{} asked for a new group {} without specifying the size of the group",
                        client, group_name
                    )
                })?;
            let size = usize::try_from(size).map_err(|_| format!("Invalid group_size {}", size))?;
            tracing::info!("The {} group will contain {} nodes.", group_name, size);
            self.groups.insert(group_name.to_string(), Group::new(size));
        }
        if let Some(group) = self.groups.get_mut(group_name) {
            group.join(
                client,
                text("hostname").unwrap_or_default(),
                text("role").unwrap_or_default(),
            );
        }
        Ok((group_name.to_string(), client.to_string()))
    }

    /// Count a finished client; the group goes once all have finished
    fn clear_group(&mut self, group_name: &str) -> Value {
        let Some(group) = self.groups.get_mut(group_name) else {
            return nack();
        };
        group.complete += 1;
        tracing::debug!(
            "clear Group Data: {} of {}",
            group.complete,
            group.clients.len()
        );
        if group.complete >= group.clients.len() {
            tracing::debug!("Clearing group data for {}", group_name);
            self.groups.remove(group_name);
        }
        ack()
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
