// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by every part of the engine
//!
//! Each kind is a distinct variant so that retry wrappers and the job
//! runner can match on it instead of inspecting message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Return code for a job that was canceled by the operator
pub const CANCELED_CODE: i32 = 6;

/// Return code for a failure that does not map to a known kind
pub const UNKNOWN_CODE: i32 = 7;

/// Classification of an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Job definition or device configuration is inconsistent
    Configuration,
    /// Job-level failure (bad data, protocol misuse, exhausted retries)
    Job,
    /// Host tool, network resource or protocol connection unavailable
    Infrastructure,
    /// Failure reported by the test payload itself
    Test,
    /// A bounded operation ran out of time
    Timeout,
    /// Engine misuse; never recoverable
    Bug,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "Configuration",
            ErrorKind::Job => "Job",
            ErrorKind::Infrastructure => "Infrastructure",
            ErrorKind::Test => "Test",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Bug => "Bug",
        }
    }

    /// Process return code for this kind
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::Infrastructure => 1,
            ErrorKind::Job => 2,
            ErrorKind::Bug => 3,
            ErrorKind::Test => 4,
            ErrorKind::Configuration => 5,
            // a bare timeout kind behaves like the default timeout exception
            ErrorKind::Timeout => 1,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised while building, validating or running a job
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LavaError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Job(String),
    #[error("{0}")]
    Infrastructure(String),
    #[error("{0}")]
    Test(String),
    #[error("{name} timed out after {elapsed} seconds")]
    Timeout {
        name: String,
        elapsed: u64,
        /// Kind reported for this timeout when the job fails
        exception: ErrorKind,
    },
    #[error("{0}")]
    Bug(String),
}

impl LavaError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        LavaError::Configuration(msg.into())
    }

    pub fn job(msg: impl Into<String>) -> Self {
        LavaError::Job(msg.into())
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        LavaError::Infrastructure(msg.into())
    }

    pub fn test(msg: impl Into<String>) -> Self {
        LavaError::Test(msg.into())
    }

    pub fn bug(msg: impl Into<String>) -> Self {
        LavaError::Bug(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LavaError::Configuration(_) => ErrorKind::Configuration,
            LavaError::Job(_) => ErrorKind::Job,
            LavaError::Infrastructure(_) => ErrorKind::Infrastructure,
            LavaError::Test(_) => ErrorKind::Test,
            LavaError::Timeout { .. } => ErrorKind::Timeout,
            LavaError::Bug(_) => ErrorKind::Bug,
        }
    }

    /// Return code of the dispatcher process when this error ends the job
    pub fn error_code(&self) -> i32 {
        match self {
            LavaError::Timeout { exception, .. } => exception.code(),
            other => other.kind().code(),
        }
    }

    /// Name recorded as `error_type` in the final job result
    pub fn error_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// One-line hint for operators reading the job log
    pub fn error_help(&self) -> String {
        match self {
            LavaError::Configuration(_) => {
                "ConfigurationError: the dispatcher or device configuration is invalid".to_string()
            }
            LavaError::Job(_) => "JobError: the job definition or its data is invalid".to_string(),
            LavaError::Infrastructure(_) => {
                "InfrastructureError: the dispatcher or device failed, retry the job".to_string()
            }
            LavaError::Test(_) => "TestError: the test payload reported a failure".to_string(),
            LavaError::Timeout { name, .. } => {
                format!("TimeoutError: {} exceeded its time budget", name)
            }
            LavaError::Bug(_) => "LAVABug: this is probably a bug in the engine".to_string(),
        }
    }

    /// Whether a retry wrapper may attempt the failed work again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Infrastructure | ErrorKind::Job | ErrorKind::Test | ErrorKind::Timeout
        )
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
