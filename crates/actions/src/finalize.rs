// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The last action of every job

use async_trait::async_trait;
use lava_core::{Action, Connection, LavaError, PopulateContext, RunContext};
use serde_json::json;
use std::sync::Arc;

/// Powers the device off and releases connections and protocols.
///
/// Always the last action of the root pipeline. When the job fails
/// earlier, cleanup runs it instead, provided the job had started.
#[derive(Default)]
pub struct FinalizeAction {
    ran: bool,
}

impl FinalizeAction {
    pub fn new() -> Self {
        Self::default()
    }

    async fn finish(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), LavaError> {
        self.ran = true;
        let powered_off = cx.run_pipeline(connection).await;

        let mut first_error: Option<LavaError> = None;
        if let Some(mut conn) = connection.take() {
            tracing::info!(connection = conn.name(), "Finalising connection");
            if let Err(e) = conn.finalise().await {
                first_error.get_or_insert(e);
            }
        }
        for (namespace, mut conn) in cx.env_mut().take_parked() {
            tracing::info!(namespace = %namespace, "Finalising parked connection {}", conn.name());
            if let Err(e) = conn.finalise().await {
                first_error.get_or_insert(e);
            }
        }

        let device = Arc::clone(&cx.env().device);
        for protocol in cx.env_mut().protocols.iter_mut() {
            tracing::debug!(protocol = protocol.name(), "finalising protocol");
            if let Err(e) = protocol.finalise_protocol(&device).await {
                tracing::error!(protocol = protocol.name(), error = %e, "unable to finalise protocol");
                first_error.get_or_insert(e);
            }
        }

        powered_off?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Action for FinalizeAction {
    fn name(&self) -> &str {
        "finalize"
    }

    fn summary(&self) -> &str {
        "finalize the job"
    }

    fn description(&self) -> &str {
        "finish the process and cleanup"
    }

    fn section(&self) -> Option<&str> {
        Some("finalize")
    }

    fn populate(&mut self, cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
        cx.add_action(Box::new(PowerOffAction), None)?;
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        self.finish(cx, connection).await?;
        Ok(None)
    }

    async fn cleanup(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<(), LavaError> {
        if self.ran || !cx.env().started {
            return Ok(());
        }
        tracing::info!("Finalizing after an incomplete job");
        self.finish(cx, connection).await
    }
}

/// Runs `commands.power_off` on the dispatcher host
pub struct PowerOffAction;

#[async_trait]
impl Action for PowerOffAction {
    fn name(&self) -> &str {
        "power-off"
    }

    fn summary(&self) -> &str {
        "send power_off command"
    }

    fn description(&self) -> &str {
        "discontinue power to device"
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        _connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let commands: Vec<String> = match &cx.device().commands.power_off {
            Some(list) => list.commands().into_iter().map(str::to_string).collect(),
            None => {
                tracing::debug!("No power_off command configured");
                return Ok(None);
            }
        };
        let runner = cx.runner()?;
        for command in commands {
            let output = runner.run(&command, cx.remaining()).await?;
            if !output.success() {
                return Err(LavaError::infrastructure(format!("{} failed", command)));
            }
        }
        cx.set_result("status", json!("success"));
        Ok(None)
    }
}

#[cfg(test)]
#[path = "finalize_tests.rs"]
mod tests;
