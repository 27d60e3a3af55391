// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sub-job identifiers of a multinode group

use lava_core::LavaError;
use std::fmt;

/// `<base>.<index>`, where `base` is the id of the submitted job
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubId {
    pub base: String,
    pub index: u32,
}

impl SubId {
    pub fn parse(text: &str) -> Result<Self, LavaError> {
        let invalid = || LavaError::job(format!("Invalid sub_id '{}'", text));
        let (base, index) = text.rsplit_once('.').ok_or_else(invalid)?;
        if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid());
        }
        let index = index.parse().map_err(|_| invalid())?;
        Ok(Self {
            base: base.to_string(),
            index,
        })
    }
}

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.index)
    }
}

/// One id per sub-job, contiguous from zero
pub fn sub_ids(base: &str, count: u32) -> Vec<SubId> {
    (0..count)
        .map(|index| SubId {
            base: base.to_string(),
            index,
        })
        .collect()
}

#[cfg(test)]
#[path = "sub_id_tests.rs"]
mod tests;
