// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Coordination protocols attached to a job
//!
//! - `lava-multinode`: message passing between the sub-jobs of a group
//!   through the coordinator
//! - `lava-vland`: vlans created through VLANd for a multinode group
//!
//! Both talk to their service with the same length-prefixed JSON codec.

pub mod client;
pub mod codec;
pub mod multinode;
mod select;
pub mod settings;
pub mod vland;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientState, PollClient};
pub use codec::{CodecError, MAX_CLIENT_MESSAGE, MAX_MESSAGE};
pub use multinode::{MultinodeHandle, MultinodeProtocol, SubId};
pub use select::select_all;
pub use settings::{CoordinatorSettings, ProtocolSettings, VlandSettings};
pub use vland::VlandProtocol;
