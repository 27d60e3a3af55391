// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lava-core: the test-job execution engine
//!
//! This crate provides:
//! - The action arena, pipeline walker and retry wrapper
//! - Timeouts and the error taxonomy shared by every crate
//! - Namespace data shared between actions
//! - Traits for connections, host commands, protocols and result sinks
//! - Strategy selection for deploy, boot and test stages

pub mod action;
pub mod connection;
pub mod device;
pub mod error;
pub mod job;
pub mod namespace;
pub mod pipeline;
pub mod protocol;
pub mod results;
pub mod retry;
pub mod strategy;
pub mod timeout;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{
    Action, ActionId, ActionMeta, ActionTree, Parameters, PipelineId, PopulateContext, RunContext,
    ValidateContext,
};
pub use connection::{CommandOutput, CommandRunner, Connection, Connector, ExpectMatch};
pub use device::{CommandList, DeviceConfig, TimeoutBlock, UserCommand};
pub use error::{ErrorKind, LavaError, CANCELED_CODE, UNKNOWN_CODE};
pub use job::{Job, JobEnv, JobOutcome, COMPATIBILITY};
pub use namespace::{NamespaceData, DEFAULT_NAMESPACE};
pub use protocol::{Protocol, ProtocolSet};
pub use results::{MemorySink, ResultSink, TracingSink};
pub use retry::{RetryAction, RETRY_SLEEP};
pub use strategy::Strategy;
pub use timeout::{Timeout, ACTION_TIMEOUT, OVERRIDE_CLAMP_DURATION};
