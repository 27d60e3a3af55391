// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake command runner for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use async_trait::async_trait;
use lava_core::{CommandOutput, CommandRunner, LavaError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records commands and answers from scripted responses.
///
/// Commands without a matching response succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeRunner {
    responses: Arc<Mutex<Vec<(String, CommandOutput)>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `fragment` with `output`
    pub fn respond(self, fragment: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((fragment.to_string(), output));
        self
    }

    /// Make commands containing `fragment` exit with `status`
    pub fn fail(self, fragment: &str, status: i32, stderr: &str) -> Self {
        self.respond(
            fragment,
            CommandOutput {
                status,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, LavaError> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.to_string());
        let responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        Ok(responses
            .iter()
            .find(|(fragment, _)| command.contains(fragment.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}
