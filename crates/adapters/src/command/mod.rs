// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host command runners

use async_trait::async_trait;
use lava_core::{CommandOutput, CommandRunner, LavaError, Timeout};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRunner;

/// Runs commands through `sh -c` on the dispatcher host
#[derive(Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, LavaError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(LavaError::infrastructure(format!(
                    "Unable to start '{}': {}",
                    command, e
                )))
            }
            Err(_) => return Err(Timeout::new(command, timeout).expired(timeout)),
        };

        Ok(CommandOutput {
            // Killed by a signal
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
