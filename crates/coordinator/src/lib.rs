// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lava-coordinator: the message broker for multinode groups
//!
//! Sub-jobs of a group poll the coordinator over TCP with framed JSON
//! requests to join their group, exchange messages and synchronise.

pub mod config;
pub mod group;
pub mod server;

pub use config::{Config, ConfigError, DEFAULT_CONFIG_PATH};
pub use group::{Coordinator, Group};
pub use server::{handle_connection, Server, ServerError};
