// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator lifecycle specs
//!
//! Verify lava-coordinator start-up, framing on the wire and shutdown.

use std::process::{Command, Stdio};
use std::time::Duration;

use crate::prelude::*;

#[test]
fn coordinator_logs_its_address() {
    let lab = Lab::passing();
    let coordinator = Coordinator::start(&lab);
    let expected = format!("listening on 127.0.0.1:{}", coordinator.port());
    assert!(
        wait_for(Duration::from_secs(5), || coordinator.log().contains(&expected)),
        "log:\n{}",
        coordinator.log()
    );
}

#[test]
fn coordinator_answers_framed_requests() {
    let lab = Lab::passing();
    let coordinator = Coordinator::start(&lab);

    let reply = coordinator.request(
        r#"{"request":"group_data","client_name":"9.0","group_name":"g9","group_size":2,"role":"server"}"#,
    );
    similar_asserts::assert_eq!(reply, r#"{"response":"wait"}"#);
}

#[test]
fn malformed_request_is_refused() {
    let lab = Lab::passing();
    let coordinator = Coordinator::start(&lab);

    let reply = coordinator.request(r#"{"request":"lava_send","group_name":"g9"}"#);
    similar_asserts::assert_eq!(reply, r#"{"response":"nack"}"#);
}

#[test]
fn sigterm_stops_the_coordinator() {
    let lab = Lab::passing();
    let coordinator = Coordinator::start(&lab);
    let output = coordinator.terminate();
    assert!(output.status.success());
}

#[test]
fn invalid_configuration_prevents_start() {
    let lab = Lab::passing();
    let config = lab.file("coordinator.toml", "port = \"many\"\n");
    #[allow(deprecated)]
    let output = Command::new(assert_cmd::cargo::cargo_bin("lava-coordinator"))
        .arg(&config)
        .stdout(Stdio::null())
        .output()
        .unwrap();
    RunAssert::from_output(output).stderr_has("Invalid configuration");
}
