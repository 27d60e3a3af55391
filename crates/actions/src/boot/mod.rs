// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot strategies
//!
//! Booting opens the session later stages talk through and waits for the
//! device to present one of the job's prompts.

use async_trait::async_trait;
use lava_core::{
    Action, Connection, DeviceConfig, LavaError, Parameters, RetryAction, RunContext, Strategy,
    ValidateContext,
};
use serde_json::{json, Value};

/// Closed set of boot methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boot {
    Shell,
}

pub const BOOT: [Boot; 1] = [Boot::Shell];

impl Strategy for Boot {
    fn name(&self) -> &str {
        match self {
            Boot::Shell => "shell",
        }
    }

    fn priority(&self) -> u32 {
        1
    }

    fn accepts(&self, device: &DeviceConfig, parameters: &Parameters) -> (bool, String) {
        if parameters.get("method").and_then(Value::as_str) != Some("shell") {
            return (false, "'method' was not 'shell'".to_string());
        }
        if !device.has_method("boot", "shell") {
            return (false, "'shell' not in the device configuration boot methods".to_string());
        }
        (true, "accepted".to_string())
    }

    fn build(&self) -> Box<dyn Action> {
        Box::new(
            RetryAction::new(
                "boot-shell-retry",
                "boot shell with retry",
                "connect to the device and wait for a shell prompt",
            )
            .with_section("boot")
            .with_child(Box::new(ExecuteShell))
            .with_child(Box::new(ExpectShellSession)),
        )
    }
}

fn prompts(parameters: &Parameters) -> Vec<String> {
    match parameters.get("prompts") {
        Some(Value::String(one)) => vec![one.clone()],
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Opens the device session with `commands.connect`
pub struct ExecuteShell;

#[async_trait]
impl Action for ExecuteShell {
    fn name(&self) -> &str {
        "execute-shell"
    }

    fn summary(&self) -> &str {
        "execute a shell command"
    }

    fn description(&self) -> &str {
        "run the device connect command and hand over the session"
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        if cx.device().commands.connect.is_none() {
            cx.error("Unable to connect to shell - missing connect command.");
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let command = cx
            .device()
            .commands
            .connect
            .clone()
            .ok_or_else(|| LavaError::job("Unable to connect to shell - missing connect command."))?;
        if let Some(mut previous) = connection.take() {
            tracing::debug!(connection = previous.name(), "replacing connection");
            previous.finalise().await?;
        }

        let name = match cx.device().hostname() {
            "" => "shell".to_string(),
            host => host.to_string(),
        };
        tracing::info!(connection = %name, "{}", command);
        let mut session = cx.connector()?.connect(&name, &command).await?;
        session.set_prompt_str(prompts(cx.parameters()));
        session.set_timeout(cx.meta().connection_timeout.clone());
        cx.set_namespace_data("shared", "shared", "connection", json!(name));
        Ok(Some(session))
    }
}

/// Waits for one of the job's prompts on the new session
pub struct ExpectShellSession;

#[async_trait]
impl Action for ExpectShellSession {
    fn name(&self) -> &str {
        "expect-shell-session"
    }

    fn summary(&self) -> &str {
        "Expect a shell prompt"
    }

    fn description(&self) -> &str {
        "Wait for a shell"
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        if prompts(cx.parameters()).is_empty() {
            cx.error("Unable to identify boot prompts from job definition.");
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let conn = connection
            .as_mut()
            .ok_or_else(|| LavaError::bug("No connection to wait on for a shell prompt"))?;
        conn.set_timeout(cx.meta().connection_timeout.clone());
        tracing::debug!(prompts = ?conn.prompt_str(), "waiting for a shell prompt");
        let found = conn.wait(cx.max_end_time()).await?;
        cx.set_result("prompt", json!(found.matched));
        Ok(None)
    }
}

#[cfg(test)]
#[path = "boot_tests.rs"]
mod tests;
