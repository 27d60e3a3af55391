// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry wrapper around a child pipeline
//!
//! With `failure_retry` the child pipeline runs until the first success, at
//! most `max_retries` times. With `repeat` it runs `max_retries` times and
//! fails at the end if any iteration failed.

use crate::action::{Action, PopulateContext, RunContext, ValidateContext};
use crate::connection::Connection;
use crate::error::LavaError;
use async_trait::async_trait;
use serde_json::json;

/// Delay between attempts unless the job environment overrides it
pub const RETRY_SLEEP: std::time::Duration = std::time::Duration::from_secs(1);

/// Runs its child pipeline again after retryable failures
pub struct RetryAction {
    name: String,
    summary: String,
    description: String,
    section: Option<String>,
    children: Vec<Box<dyn Action>>,
}

impl RetryAction {
    pub fn new(
        name: impl Into<String>,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            description: description.into(),
            section: None,
            children: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Action added to the child pipeline when this action is populated
    pub fn with_child(mut self, child: Box<dyn Action>) -> Self {
        self.children.push(child);
        self
    }
}

#[async_trait]
impl Action for RetryAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) -> &str {
        &self.summary
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    fn class(&self) -> &'static str {
        "RetryAction"
    }

    fn populate(&mut self, cx: &mut PopulateContext<'_>) -> Result<(), LavaError> {
        if self.children.is_empty() {
            return Ok(());
        }
        cx.pipeline()?;
        for child in self.children.drain(..) {
            cx.add_action(child, None)?;
        }
        Ok(())
    }

    fn validate(&mut self, cx: &mut ValidateContext<'_>) -> Result<(), LavaError> {
        if cx.child().is_none() {
            return Err(LavaError::bug(format!(
                "Retry action {} needs to implement an internal pipeline",
                cx.meta().name
            )));
        }
        Ok(())
    }

    async fn run(
        &mut self,
        cx: &mut RunContext<'_>,
        connection: &mut Option<Box<dyn Connection>>,
    ) -> Result<Option<Box<dyn Connection>>, LavaError> {
        let max_retries = cx.meta().max_retries.max(1);
        let repeat = cx.parameters().contains_key("repeat");
        let name = cx.name().to_string();
        let level = cx.level().to_string();
        let sleep = cx.env().retry_sleep;

        let mut attempts = 0;
        let mut failures = 0;
        while attempts < max_retries {
            attempts += 1;
            cx.set_result("attempts", json!(attempts));
            let error = match cx.run_pipeline(connection).await {
                Ok(()) if repeat => continue,
                Ok(()) => return Ok(None),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };
            failures += 1;
            tracing::error!(
                "{} failed: {} of {} attempts. '{}'",
                name,
                attempts,
                max_retries,
                error
            );
            cx.cleanup_pipeline(connection).await;

            if attempts == max_retries {
                if repeat {
                    break;
                }
                cx.meta_mut()
                    .errors
                    .push(format!("{} retries failed for {}", attempts, name));
                if let Some(conn) = connection.take() {
                    let namespace = cx.namespace();
                    cx.env_mut().park(&namespace, conn);
                }
                return Err(error);
            }

            cx.env_mut().protocols.reset().await;
            tokio::time::sleep(sleep).await;
            tracing::warn!("Retrying: {} {}", level, name);
        }

        if failures > 0 {
            return Err(LavaError::job(format!(
                "{} retries failed for {}",
                failures, name
            )));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
