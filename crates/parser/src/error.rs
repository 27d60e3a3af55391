// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parse errors

use lava_core::LavaError;
use thiserror::Error;

/// What a definition describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Job,
    Device,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Job => write!(f, "job"),
            Source::Device => write!(f, "device"),
        }
    }
}

/// Errors from reading job and device definitions
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid {source_of} YAML: {error}")]
    Yaml {
        source_of: Source,
        #[source]
        error: serde_yaml::Error,
    },

    #[error("Invalid {source_of} definition: {reason}")]
    Invalid { source_of: Source, reason: String },

    #[error(transparent)]
    Lava(#[from] LavaError),
}

impl ParseError {
    pub(crate) fn job(reason: impl Into<String>) -> Self {
        ParseError::Invalid {
            source_of: Source::Job,
            reason: reason.into(),
        }
    }
}

impl From<ParseError> for LavaError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Lava(e) => e,
            ParseError::Yaml {
                source_of: Source::Device,
                ..
            }
            | ParseError::Invalid {
                source_of: Source::Device,
                ..
            } => LavaError::configuration(err.to_string()),
            other => LavaError::job(other.to_string()),
        }
    }
}
