// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named host commands from the device configuration

use async_trait::async_trait;
use lava_core::{Action, Connection, LavaError, RunContext, ValidateContext};
use serde_json::{json, Value};

/// Runs `commands.users[name].do` on the dispatcher host.
///
/// The matching `undo`, when configured, runs at cleanup after a
/// successful `do`.
#[derive(Default)]
pub struct CommandAction {
    ran: bool,
}

impl CommandAction {
    pub fn new() -> Self {
        Self::default()
    }
}

fn command_name(parameters: &lava_core::Parameters) -> Option<&str> {
    parameters.get("name").and_then(Value::as_str)
}

#[async_trait]
impl Action for CommandAction {
    fn name(&self) -> &str {
        "user-command"
    }

    fn summary(&self) -> &str {
        "execute commands"
    }

    fn description(&self) -> &str {
        "execute one of the commands listed by the admin"
    }

    fn section(&self) -> Option<&str> {
        Some("command")
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        let Some(name) = command_name(cx.parameters()) else {
            return Err(LavaError::job("missing name for the user command"));
        };
        if !cx.device().commands.users.contains_key(name) {
            let known: Vec<&String> = cx.device().commands.users.keys().collect();
            return Err(LavaError::job(format!(
                "Unknown user command '{}', device supports {:?}",
                name, known
            )));
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let name = command_name(cx.parameters()).unwrap_or_default().to_string();
        let Some(command) = cx.device().commands.users.get(&name).map(|c| c.run.clone()) else {
            return Err(LavaError::bug(format!("user command '{}' vanished", name)));
        };
        tracing::info!(command = %name, "running user command '{}'", command);
        let output = cx.runner()?.run_checked(&command, cx.remaining()).await?;
        self.ran = true;
        cx.set_result("command", json!(name));
        if !output.stdout.trim().is_empty() {
            tracing::debug!(command = %name, "{}", output.stdout.trim_end());
        }
        Ok(None)
    }

    async fn cleanup(
        &mut self,
        cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), LavaError> {
        if !self.ran {
            return Ok(());
        }
        self.ran = false;
        let name = command_name(cx.parameters()).unwrap_or_default().to_string();
        let Some(undo) = cx
            .device()
            .commands
            .users
            .get(&name)
            .and_then(|c| c.undo.clone())
        else {
            return Ok(());
        };
        tracing::info!(command = %name, "undoing user command '{}'", undo);
        cx.runner()?.run_checked(&undo, cx.remaining()).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
