// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive sessions over a spawned shell process

use crate::expect::{ExpectBuffer, Patterns};
use crate::traced::TracedConnection;
use async_trait::async_trait;
use lava_core::{Connection, Connector, ErrorKind, ExpectMatch, LavaError, Timeout, ACTION_TIMEOUT};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ConnectionCall, FakeConnection, FakeConnector};

/// Errors from session adapters
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Unable to start '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Connection closed")]
    Closed,
    #[error("Unable to write to connection: {0}")]
    Write(std::io::Error),
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("{name} timed out after {seconds} seconds")]
    TimedOut { name: String, seconds: u64 },
}

impl From<ConnectionError> for LavaError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::TimedOut { name, seconds } => LavaError::Timeout {
                name,
                elapsed: seconds,
                exception: ErrorKind::Infrastructure,
            },
            ConnectionError::Pattern { .. } => LavaError::job(err.to_string()),
            other => LavaError::infrastructure(other.to_string()),
        }
    }
}

/// A shell session running `sh -c <command>`
pub struct ShellConnection {
    name: String,
    tags: Vec<String>,
    prompts: Vec<String>,
    timeout: Timeout,
    child: Child,
    stdin: Option<ChildStdin>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: ExpectBuffer,
    connected: bool,
}

impl ShellConnection {
    /// Spawn the command. Must be called from within a tokio runtime.
    pub fn spawn(name: &str, command: &str) -> Result<Self, ConnectionError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConnectionError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx));
        }
        let stdin = child.stdin.take();

        tracing::debug!(name, command, pid = ?child.id(), "spawned connection");
        Ok(Self {
            name: name.to_string(),
            tags: Vec::new(),
            prompts: Vec::new(),
            timeout: Timeout::new(name, ACTION_TIMEOUT),
            child,
            stdin,
            output: rx,
            buffer: ExpectBuffer::default(),
            connected: true,
        })
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Wait for the next chunk of output
    async fn fill(&mut self, deadline: Instant, limit: Duration) -> Result<(), ConnectionError> {
        match tokio::time::timeout_at(deadline, self.output.recv()).await {
            Ok(Some(chunk)) => {
                self.buffer.push(&chunk);
                Ok(())
            }
            Ok(None) => {
                self.connected = false;
                Err(ConnectionError::Closed)
            }
            Err(_) => Err(ConnectionError::TimedOut {
                name: self.timeout.name().to_string(),
                seconds: limit.as_secs(),
            }),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let stdin = self.stdin.as_mut().ok_or(ConnectionError::Closed)?;
        stdin.write_all(bytes).await.map_err(ConnectionError::Write)?;
        stdin.flush().await.map_err(ConnectionError::Write)
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(chunk[..n].to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Connection for ShellConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn prompt_str(&self) -> &[String] {
        &self.prompts
    }

    fn set_prompt_str(&mut self, prompts: Vec<String>) {
        self.prompts = prompts;
    }

    fn timeout(&self) -> &Timeout {
        &self.timeout
    }

    fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }

    fn raw_connection(&self) -> Option<u32> {
        self.child.id()
    }

    async fn sendline(&mut self, line: &str, delay: Duration) -> Result<(), LavaError> {
        if delay.is_zero() {
            self.write(format!("{}\n", line).as_bytes()).await?;
            return Ok(());
        }
        let mut encoded = [0u8; 4];
        for c in line.chars() {
            self.write(c.encode_utf8(&mut encoded).as_bytes()).await?;
            tokio::time::sleep(delay).await;
        }
        self.write(b"\n").await?;
        Ok(())
    }

    async fn expect(
        &mut self,
        patterns: &[String],
        timeout: Duration,
    ) -> Result<ExpectMatch, LavaError> {
        let patterns = Patterns::compile(patterns)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.buffer.take_match(&patterns) {
                return Ok(found);
            }
            self.fill(deadline, timeout).await?;
        }
    }

    async fn readline(&mut self, timeout: Duration) -> Result<String, LavaError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.buffer.take_line() {
                return Ok(line);
            }
            self.fill(deadline, timeout).await?;
        }
    }

    async fn finalise(&mut self) -> Result<(), LavaError> {
        self.stdin = None;
        if self.child.start_kill().is_ok() {
            let status = self.child.wait().await;
            tracing::debug!(name = %self.name, ?status, "connection closed");
        }
        self.connected = false;
        Ok(())
    }
}

/// Opens traced shell connections from device connect commands
#[derive(Clone, Default)]
pub struct ShellConnector;

impl ShellConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for ShellConnector {
    async fn connect(&self, name: &str, command: &str) -> Result<Box<dyn Connection>, LavaError> {
        let connection = ShellConnection::spawn(name, command)?;
        Ok(Box::new(TracedConnection::new(connection)))
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
