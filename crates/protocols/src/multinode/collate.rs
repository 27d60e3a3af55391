// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of `$name` markers in a wait template against sender data

use lava_core::LavaError;
use serde_json::{Map, Value};

/// Resolve the markers of `request.message` against the senders in `reply`.
///
/// `reply` is either `{"message": {sender: payload}}` or the bare sender
/// map. All markers resolve against one sender: `own` when it provides
/// every field, else the only sender that does, else the first such sender
/// by name. Returns `None` when the template has no markers.
pub fn collate(
    reply: &Value,
    request: &Value,
    own: &str,
) -> Result<Option<(String, Value)>, LavaError> {
    let Some(message_id) = request.get("messageID").and_then(Value::as_str) else {
        return Ok(None);
    };
    let Some(template) = request.get("message").and_then(Value::as_object) else {
        return Ok(None);
    };

    // (output key, sender field)
    let markers: Vec<(&str, &str)> = template
        .iter()
        .filter(|(key, _)| key.as_str() != "yaml_line")
        .filter_map(|(key, value)| {
            let marker = value.as_str()?.strip_prefix('$')?;
            Some((key.as_str(), if marker.is_empty() { key.as_str() } else { marker }))
        })
        .collect();
    if markers.is_empty() {
        return Ok(None);
    }

    let senders = match reply.get("message").and_then(Value::as_object) {
        Some(wrapped) => wrapped,
        None => reply.as_object().ok_or_else(|| {
            LavaError::job(format!("Invalid reply for {}: {}", message_id, reply))
        })?,
    };

    let provides = |payload: &Map<String, Value>| {
        markers.iter().all(|(_, field)| payload.contains_key(*field))
    };
    let mut candidates: Vec<(&String, &Map<String, Value>)> = senders
        .iter()
        .filter_map(|(sender, payload)| Some((sender, payload.as_object()?)))
        .filter(|(_, payload)| provides(payload))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(b.0));

    let chosen = candidates
        .iter()
        .find(|(sender, _)| sender.as_str() == own)
        .or_else(|| candidates.first())
        .map(|(_, payload)| *payload)
        .ok_or_else(|| {
            let fields: Vec<&str> = markers.iter().map(|(_, field)| *field).collect();
            LavaError::job(format!(
                "No sender provided {:?} for messageID {}",
                fields, message_id
            ))
        })?;

    let mut resolved = Map::new();
    for (key, field) in &markers {
        if let Some(value) = chosen.get(*field) {
            resolved.insert((*key).to_string(), value.clone());
        }
    }
    Ok(Some((message_id.to_string(), Value::Object(resolved))))
}

#[cfg(test)]
#[path = "collate_tests.rs"]
mod tests;
