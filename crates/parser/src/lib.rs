// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lava-parser: job and device YAML to a runnable job

mod error;
mod job;

pub use error::{ParseError, Source};
pub use job::{parse_device, JobParser, ParseOptions};
