// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Concrete actions and the strategies that select them
//!
//! Each stage has a closed set of candidates:
//! - deploy: `download`, `commands`
//! - boot: `shell`
//! - test: `lava-test-shell`, `multinode-test`

pub mod boot;
pub mod command;
pub mod deploy;
pub mod finalize;
pub mod test;

#[cfg(test)]
pub(crate) mod testing;

pub use boot::{Boot, ExecuteShell, ExpectShellSession, BOOT};
pub use command::CommandAction;
pub use deploy::{
    CommandsDeploy, Deploy, DownloadAction, DownloadDeploy, VlandOverlayAction, DEPLOY,
};
pub use finalize::{FinalizeAction, PowerOffAction};
pub use self::test::{LavaTest, TestShellAction, TEST};
