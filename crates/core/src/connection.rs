// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive sessions and host commands used by actions
//!
//! Concrete implementations live in the adapters crate. Actions only see
//! these traits so that tests can script a device without spawning anything.

use crate::error::LavaError;
use crate::timeout::{Timeout, ACTION_TIMEOUT};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Result of a successful [`Connection::expect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectMatch {
    /// Index of the pattern that matched
    pub index: usize,
    /// Full text of the match
    pub matched: String,
    /// Capture groups of the pattern, in order
    pub groups: Vec<Option<String>>,
}

impl ExpectMatch {
    pub fn group(&self, n: usize) -> Option<&str> {
        self.groups.get(n).and_then(|g| g.as_deref())
    }
}

/// An interactive shell session to a device or container.
///
/// Owned by exactly one action at a time. An action that replaces the
/// session (for example after a boot) returns the new one to the walker.
#[async_trait]
pub trait Connection: Send {
    fn name(&self) -> &str;

    fn tags(&self) -> &[String];

    fn connected(&self) -> bool;

    fn prompt_str(&self) -> &[String];

    fn set_prompt_str(&mut self, prompts: Vec<String>);

    fn timeout(&self) -> &Timeout;

    fn set_timeout(&mut self, timeout: Timeout);

    /// Process id of the underlying session, when there is one
    fn raw_connection(&self) -> Option<u32>;

    /// Send `line` followed by a newline, pausing `delay` between characters
    async fn sendline(&mut self, line: &str, delay: Duration) -> Result<(), LavaError>;

    /// Wait for the first of `patterns` (regular expressions) to appear
    async fn expect(&mut self, patterns: &[String], timeout: Duration)
        -> Result<ExpectMatch, LavaError>;

    async fn readline(&mut self, timeout: Duration) -> Result<String, LavaError>;

    /// Wait for one of the prompts until `max_end_time`
    async fn wait(&mut self, max_end_time: Option<Instant>) -> Result<ExpectMatch, LavaError> {
        let prompts = self.prompt_str().to_vec();
        if prompts.is_empty() {
            return Err(LavaError::bug(format!(
                "Connection {} has no prompt to wait for",
                self.name()
            )));
        }
        let remaining = match max_end_time {
            Some(end) => end.saturating_duration_since(Instant::now()),
            None => self.timeout().duration().unwrap_or(ACTION_TIMEOUT),
        };
        self.expect(&prompts, remaining).await
    }

    async fn finalise(&mut self) -> Result<(), LavaError>;
}

/// Opens connections for boot actions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, name: &str, command: &str) -> Result<Box<dyn Connection>, LavaError>;
}

/// Output of a host command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs commands on the dispatcher host (power control, user commands)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, LavaError>;

    /// Run and turn a non-zero exit status into an Infrastructure error
    async fn run_checked(&self, command: &str, timeout: Duration) -> Result<CommandOutput, LavaError> {
        let output = self.run(command, timeout).await?;
        if !output.success() {
            return Err(LavaError::infrastructure(format!(
                "Unable to run '{}' (exit {}): {}",
                command,
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}
