// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced wrappers for consistent observability of device I/O

use async_trait::async_trait;
use lava_core::{CommandOutput, CommandRunner, Connection, ExpectMatch, LavaError, Timeout};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Wrapper that adds tracing to any Connection
pub struct TracedConnection<C> {
    inner: C,
}

impl<C> TracedConnection<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: Connection> Connection for TracedConnection<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn tags(&self) -> &[String] {
        self.inner.tags()
    }

    fn connected(&self) -> bool {
        self.inner.connected()
    }

    fn prompt_str(&self) -> &[String] {
        self.inner.prompt_str()
    }

    fn set_prompt_str(&mut self, prompts: Vec<String>) {
        tracing::debug!(connection = %self.inner.name(), ?prompts, "prompts set");
        self.inner.set_prompt_str(prompts);
    }

    fn timeout(&self) -> &Timeout {
        self.inner.timeout()
    }

    fn set_timeout(&mut self, timeout: Timeout) {
        self.inner.set_timeout(timeout);
    }

    fn raw_connection(&self) -> Option<u32> {
        self.inner.raw_connection()
    }

    async fn sendline(&mut self, line: &str, delay: Duration) -> Result<(), LavaError> {
        let span = tracing::debug_span!("connection.sendline", connection = %self.inner.name());
        let result = self.inner.sendline(line, delay).instrument(span.clone()).await;
        span.in_scope(|| match &result {
            Ok(()) => tracing::debug!(line, "sent"),
            Err(e) => tracing::error!(line, error = %e, "send failed"),
        });
        result
    }

    async fn expect(
        &mut self,
        patterns: &[String],
        timeout: Duration,
    ) -> Result<ExpectMatch, LavaError> {
        let span = tracing::info_span!(
            "connection.expect",
            connection = %self.inner.name(),
            timeout_ms = timeout.as_millis() as u64,
        );
        let start = Instant::now();
        let result = self.inner.expect(patterns, timeout).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        span.in_scope(|| match &result {
            Ok(found) => tracing::debug!(elapsed_ms, index = found.index, "matched"),
            Err(e) => tracing::warn!(elapsed_ms, ?patterns, error = %e, "no match"),
        });
        result
    }

    async fn readline(&mut self, timeout: Duration) -> Result<String, LavaError> {
        let result = self.inner.readline(timeout).await;
        tracing::trace!(connection = %self.inner.name(), line = ?result.as_ref().ok(), "read");
        result
    }

    async fn finalise(&mut self) -> Result<(), LavaError> {
        let span = tracing::info_span!("connection.finalise", connection = %self.inner.name());
        let result = self.inner.finalise().instrument(span.clone()).await;
        span.in_scope(|| match &result {
            Ok(()) => tracing::info!("finalised"),
            // finalise() failing is often acceptable (session already gone)
            Err(e) => tracing::warn!(error = %e, "finalise failed (may be expected)"),
        });
        result
    }
}

/// Wrapper that adds tracing to any CommandRunner
#[derive(Clone)]
pub struct TracedRunner<R> {
    inner: R,
}

impl<R> TracedRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: CommandRunner> CommandRunner for TracedRunner<R> {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, LavaError> {
        let span = tracing::info_span!("host.run", command);
        // Precondition: an empty command would run an interactive shell
        if command.trim().is_empty() {
            span.in_scope(|| tracing::error!("empty command"));
            return Err(LavaError::bug("Refusing to run an empty host command"));
        }

        let start = Instant::now();
        let result = self.inner.run(command, timeout).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        span.in_scope(|| match &result {
            Ok(output) if output.success() => tracing::info!(elapsed_ms, "command finished"),
            Ok(output) => tracing::warn!(
                elapsed_ms,
                status = output.status,
                stderr = %output.stderr.trim(),
                "command failed"
            ),
            Err(e) => tracing::error!(elapsed_ms, error = %e, "command error"),
        });
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
