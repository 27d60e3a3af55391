// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod describe;
pub mod job;
pub mod run;
pub mod validate;

use std::process::ExitCode;

/// Process exit status for a job return code
pub fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
