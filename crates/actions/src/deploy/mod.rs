// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deploy strategies
//!
//! A deploy block names its method with `to`. The device must list the
//! same method under `actions.deploy.methods`.

mod download;
mod overlay;

pub use download::DownloadAction;
pub use overlay::VlandOverlayAction;

use async_trait::async_trait;
use lava_core::{
    Action, Connection, DeviceConfig, LavaError, Parameters, PopulateContext, RetryAction,
    RunContext, Strategy, ValidateContext,
};
use lava_protocols::vland::NAME as VLAND;
use serde_json::{json, Value};

/// Closed set of deploy methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deploy {
    Download,
    Commands,
}

/// Candidates in registration order
pub const DEPLOY: [Deploy; 2] = [Deploy::Download, Deploy::Commands];

impl Deploy {
    fn method(&self) -> &'static str {
        match self {
            Deploy::Download => "download",
            Deploy::Commands => "commands",
        }
    }
}

impl Strategy for Deploy {
    fn name(&self) -> &str {
        self.method()
    }

    fn priority(&self) -> u32 {
        1
    }

    fn accepts(&self, device: &DeviceConfig, parameters: &Parameters) -> (bool, String) {
        let method = self.method();
        if parameters.get("to").and_then(Value::as_str) != Some(method) {
            return (false, format!("'to' parameter is not '{}'", method));
        }
        if !device.has_method("deploy", method) {
            return (
                false,
                format!("'{}' not in the device configuration deploy methods", method),
            );
        }
        (true, "accepted".to_string())
    }

    fn build(&self) -> Box<dyn Action> {
        match self {
            Deploy::Download => Box::new(DownloadDeploy),
            Deploy::Commands => Box::new(CommandsDeploy),
        }
    }
}

/// Downloads every entry of `images`, each with its own retry wrapper
pub struct DownloadDeploy;

#[async_trait]
impl Action for DownloadDeploy {
    fn name(&self) -> &str {
        "download-deploy"
    }

    fn summary(&self) -> &str {
        "download deployment"
    }

    fn description(&self) -> &str {
        "download files and copy to LXC if available"
    }

    fn section(&self) -> Option<&str> {
        Some("deploy")
    }

    fn populate(&mut self, cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
        let images: Vec<String> = cx
            .parameters()
            .get("images")
            .and_then(Value::as_object)
            .map(|images| images.keys().cloned().collect())
            .unwrap_or_default();
        for image in images {
            let retry = RetryAction::new(
                "download-retry",
                "download-retry",
                "download with retry",
            )
            .with_child(Box::new(DownloadAction::new(image)));
            cx.add_action(Box::new(retry), None)?;
        }
        add_vland_overlay(cx)
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        let has_images = cx
            .parameters()
            .get("images")
            .and_then(Value::as_object)
            .is_some_and(|images| !images.is_empty());
        if !has_images {
            cx.error("No images specified for download deployment");
        }
        Ok(())
    }
}

/// Vlan lookup scripts, only for jobs using the vland protocol
fn add_vland_overlay(cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
    if cx.parameters().contains_key(VLAND) {
        cx.add_action(Box::new(VlandOverlayAction), None)?;
    }
    Ok(())
}

/// Runs the deploy commands the device lists for the `commands` method
pub struct CommandsDeploy;

fn deploy_commands(device: &DeviceConfig) -> Vec<String> {
    let run = device
        .method_settings("deploy", "commands")
        .and_then(|settings| settings.get("run"));
    match run {
        Some(Value::String(one)) => vec![one.clone()],
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl Action for CommandsDeploy {
    fn name(&self) -> &str {
        "deploy-commands"
    }

    fn summary(&self) -> &str {
        "send commands to the device"
    }

    fn description(&self) -> &str {
        "run the deploy commands listed in the device configuration"
    }

    fn section(&self) -> Option<&str> {
        Some("deploy")
    }

    fn populate(&mut self, cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
        add_vland_overlay(cx)
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        if deploy_commands(cx.device()).is_empty() {
            cx.error("No commands to run for deploy to commands");
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let runner = cx.runner()?;
        let commands = deploy_commands(cx.device());
        for command in &commands {
            tracing::info!("Running deploy command '{}'", command);
            runner.run_checked(command, cx.remaining()).await?;
        }
        if cx.child().is_some() {
            cx.run_pipeline(connection).await?;
        }
        cx.set_result("commands", json!(commands.len()));
        Ok(None)
    }
}

#[cfg(test)]
#[path = "deploy_tests.rs"]
mod tests;
