// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing report of a failed job.
//!
//! States what went wrong, what kind of failure it was and how to
//! approach it, and carries the process exit code.

use lava_core::LavaError;
use std::fmt;

#[derive(Debug)]
pub struct Report {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    pub code: i32,
}

impl Report {
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            code,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Report for a job that failed validation or running
    pub fn job_failed(job_id: &str, error: &LavaError) -> Self {
        Report::new(error.to_string(), error.error_code())
            .with_context(format!("job {} failed with error type {}", job_id, error.error_type()))
            .with_suggestion(error.error_help())
    }

    /// Report for a job interrupted by the operator
    pub fn canceled(job_id: &str, code: i32) -> Self {
        Report::new(format!("job {} was canceled", job_id), code)
            .with_suggestion("Device state is unknown, power cycle it before the next job")
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}
