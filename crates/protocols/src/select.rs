// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::multinode::MultinodeProtocol;
use crate::settings::ProtocolSettings;
use crate::vland::VlandProtocol;
use lava_core::{LavaError, Protocol, ProtocolSet};
use serde_json::Value;

/// Build every protocol the job parameters ask for, sorted by level
pub fn select_all(
    parameters: &Value,
    job_id: &str,
    settings: &ProtocolSettings,
) -> Result<ProtocolSet, LavaError> {
    let mut protocols: Vec<Box<dyn Protocol>> = Vec::new();
    let mut multinode = None;
    if MultinodeProtocol::accepts(parameters) {
        let protocol = MultinodeProtocol::new(parameters, job_id, settings)?;
        multinode = Some(protocol.handle());
        protocols.push(Box::new(protocol));
    }
    if VlandProtocol::accepts(parameters) {
        protocols.push(Box::new(VlandProtocol::new(
            parameters, job_id, settings, multinode,
        )?));
    }
    let set = ProtocolSet::new(protocols);
    tracing::debug!(protocols = ?set, "selected protocols");
    Ok(set)
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
