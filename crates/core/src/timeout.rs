// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded time budgets for actions, connections and protocol calls

use crate::error::{ErrorKind, LavaError};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Default duration of an action or connection timeout
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound applied by [`Timeout::modify`]
pub const OVERRIDE_CLAMP_DURATION: Duration = Duration::from_secs(300);

/// A named time budget.
///
/// A `None` duration inherits whatever remains of the enclosing budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeout {
    name: String,
    duration: Option<Duration>,
    exception: ErrorKind,
    protected: bool,
    elapsed: Option<Duration>,
}

impl Timeout {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration: Some(duration),
            exception: ErrorKind::Infrastructure,
            protected: false,
            elapsed: None,
        }
    }

    /// A timeout bounded only by the parent deadline
    pub fn inherit(name: impl Into<String>) -> Self {
        Self {
            duration: None,
            ..Self::new(name, ACTION_TIMEOUT)
        }
    }

    /// Error kind reported when this timeout expires
    pub fn with_exception(mut self, kind: ErrorKind) -> Self {
        self.exception = kind;
        self
    }

    /// Protected timeouts cannot be changed by job or device overrides
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn default_duration() -> Duration {
        ACTION_TIMEOUT
    }

    /// Parse a `{days, hours, minutes, seconds}` mapping.
    ///
    /// An empty or all-zero mapping yields the default duration.
    pub fn parse(value: &Value) -> Result<Duration, LavaError> {
        let map = value
            .as_object()
            .ok_or_else(|| LavaError::configuration("Invalid timeout data"))?;
        let mut total = 0u64;
        for (unit, scale) in [("days", 86_400), ("hours", 3_600), ("minutes", 60), ("seconds", 1)] {
            let Some(raw) = map.get(unit) else {
                continue;
            };
            let amount = raw
                .as_u64()
                .ok_or_else(|| LavaError::configuration(format!("Invalid timeout {}: {}", unit, raw)))?;
            total = total.saturating_add(amount.saturating_mul(scale));
        }
        if total == 0 {
            return Ok(Self::default_duration());
        }
        Ok(Duration::from_secs(total))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn exception(&self) -> ErrorKind {
        self.exception
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Duration of the last run bounded by this timeout
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = Some(elapsed);
    }

    /// Replace the duration with an override from the job or device.
    ///
    /// Overrides are not clamped; only [`Timeout::modify`] is.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    /// Change the duration on request of the job, within the clamp
    pub fn modify(&mut self, duration: Duration) -> Result<(), LavaError> {
        if self.protected {
            return Err(LavaError::job(format!(
                "Trying to modify a protected timeout: {}.",
                self.name
            )));
        }
        let clamped = duration.clamp(Duration::from_secs(1), OVERRIDE_CLAMP_DURATION);
        self.duration = Some(clamped);
        Ok(())
    }

    /// Deadline for a run starting at `start` inside an enclosing deadline.
    ///
    /// A child never outlives its parent's remaining budget.
    pub fn max_end_time(&self, start: Instant, parent: Option<Instant>) -> Option<Instant> {
        let own = self.duration.map(|d| start + d);
        match (own, parent) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }

    /// Err once `elapsed` exceeds the duration, never before
    pub fn check(&self, elapsed: Duration) -> Result<(), LavaError> {
        match self.duration {
            Some(duration) if elapsed > duration => Err(self.expired(elapsed)),
            _ => Ok(()),
        }
    }

    /// The error raised when this timeout expires after `elapsed`
    pub fn expired(&self, elapsed: Duration) -> LavaError {
        LavaError::Timeout {
            name: self.name.clone(),
            elapsed: elapsed.as_secs(),
            exception: self.exception,
        }
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
