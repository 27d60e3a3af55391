// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::client::ClientState;
use crate::testing::{closed_port, FakeService};
use lava_core::ErrorKind;
use yare::parameterized;

fn parameters(block: Value) -> Value {
    json!({"protocols": {NAME: block}})
}

fn block() -> Value {
    json!({
        "target_group": "arbitrary-group-id",
        "role": "client",
        "group_size": 2,
        "sub_id": 1,
    })
}

fn settings(port: u16) -> ProtocolSettings {
    ProtocolSettings {
        coordinator: CoordinatorSettings {
            port,
            poll_delay: 0,
            coordinator_hostname: "127.0.0.1".to_string(),
            ..CoordinatorSettings::default()
        },
        ..ProtocolSettings::default()
    }
}

/// Replies the way the coordinator does for a group where 4212.0 sent an address
fn coordinator(request: &Value) -> Option<Value> {
    let reply = match request["request"].as_str().unwrap_or("") {
        "group_data" => json!({"response": "group_data", "roles": {"4212.0": "server", "4212.1": "client"}}),
        "lava_wait" | "lava_wait_all" => {
            json!({"response": "ack", "message": {"4212.0": {"ipv4": "192.168.0.2"}}})
        }
        "lava_sync" => json!({"response": "ack", "message": request["messageID"]}),
        _ => json!({"response": "ack"}),
    };
    Some(reply)
}

async fn protocol(service: &FakeService) -> MultinodeProtocol {
    let mut protocol = MultinodeProtocol::new(&parameters(block()), "4212.1", &settings(service.port())).unwrap();
    protocol
        .configure(&DeviceConfig::default(), "4212.1")
        .unwrap();
    protocol
}

// ============================================================================
// Construction
// ============================================================================

#[parameterized(
    no_protocols = { json!({}), false },
    other_protocol = { json!({"protocols": {"lava-lxc": {}}}), false },
    no_group = { json!({"protocols": {"lava-multinode": {"role": "client"}}}), false },
    group = { parameters(block()), true },
)]
fn accepts_requires_a_target_group(parameters: Value, expected: bool) {
    assert_eq!(MultinodeProtocol::accepts(&parameters), expected);
}

#[test]
fn waiting_for_own_role_is_invalid() {
    let mut block = block();
    block["request"] = json!("lava-start");
    block["expect_role"] = json!("client");
    let protocol = MultinodeProtocol::new(&parameters(block), "4212.1", &settings(1)).unwrap();
    assert!(!protocol.valid());
    assert!(!protocol.delayed_start());
    assert_eq!(
        protocol.errors(),
        &["expect_role must not match the role declaring lava_start".to_string()]
    );
}

#[tokio::test]
async fn delayed_start_takes_the_block_timeout() {
    let mut block = block();
    block["request"] = json!("lava-start");
    block["expect_role"] = json!("server");
    block["timeout"] = json!({"minutes": 5});
    let protocol = MultinodeProtocol::new(&parameters(block), "4212.1", &settings(1)).unwrap();
    assert!(protocol.valid());
    assert!(protocol.delayed_start());
    assert_eq!(protocol.system_timeout().await, Duration::from_secs(300));
}

#[test]
fn sub_id_falls_back_to_the_job_id() {
    let mut block = block();
    block.as_object_mut().unwrap().remove("sub_id");
    let protocol = MultinodeProtocol::new(&parameters(block), "4212.3", &settings(1)).unwrap();
    assert_eq!(protocol.handle().sub_id(), 3);
    assert_eq!(protocol.handle().client_name(), "4212.3");
    assert_eq!(protocol.role(), "client");
    assert_eq!(protocol.describe()["sub_id"], 3);
}

// ============================================================================
// API calls
// ============================================================================

#[tokio::test]
async fn malformed_calls_fail_before_sending() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    let cases = [
        (Value::Null, LavaError::test("Protocol called without any data")),
        (json!({}), LavaError::job("No data to be sent over protocol lava-multinode")),
        (
            json!({"messageID": "a"}),
            LavaError::job("Bad API call over protocol - missing request"),
        ),
        (
            json!({"request": "aggregate", "messageID": "a"}),
            LavaError::job("Pipeline submission has not been implemented."),
        ),
        (json!({"request": "lava-send"}), LavaError::job("Missing messageID")),
        (
            json!({"request": "lava-dance", "messageID": "a"}),
            LavaError::test("Unsupported api call: lava_dance"),
        ),
    ];
    for (request, expected) in cases {
        assert_eq!(protocol.call(&request).await.unwrap_err(), expected, "{}", request);
    }
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn calls_before_set_up_are_bugs() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    let err = protocol
        .call(&json!({"request": "lava-sync", "messageID": "go"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bug);
}

#[tokio::test]
async fn set_up_joins_the_group() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    protocol.set_up().await.unwrap();

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    let join = &requests[0];
    assert_eq!(join["request"], "group_data");
    assert_eq!(join["group_size"], 2);
    assert_eq!(join["group_name"], "arbitrary-group-id");
    assert_eq!(join["client_name"], "4212.1");
    assert_eq!(join["role"], "client");
    assert_eq!(join["port"], service.port());
}

#[tokio::test]
async fn delayed_start_waits_for_the_expected_role() {
    let service = FakeService::start(coordinator).await;
    let mut block = block();
    block["request"] = json!("lava-start");
    block["expect_role"] = json!("server");
    let mut protocol =
        MultinodeProtocol::new(&parameters(block), "4212.1", &settings(service.port())).unwrap();
    protocol.set_up().await.unwrap();

    let requests = service.requests();
    assert_eq!(requests[1]["request"], "lava_wait_all");
    assert_eq!(requests[1]["waitrole"], "server");
    assert_eq!(requests[1]["messageID"], "lava_start");
}

#[tokio::test]
async fn wait_returns_sender_data_and_collates() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    protocol.set_up().await.unwrap();

    let request = json!({"request": "lava-wait", "messageID": "ipv4", "message": {"ipv4": "$ipv4"}});
    let reply = protocol.call(&request).await.unwrap();
    assert_eq!(reply, json!({"4212.0": {"ipv4": "192.168.0.2"}}));
    assert_eq!(
        protocol.collate(&reply, &request).unwrap(),
        Some(("ipv4".to_string(), json!({"ipv4": "192.168.0.2"})))
    );

    let sent = service.requests();
    assert_eq!(sent[1]["request"], "lava_wait");
    assert_eq!(sent[1]["nodeID"], "4212.1");
}

#[tokio::test]
async fn send_wraps_bare_messages() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    protocol.set_up().await.unwrap();

    let reply = protocol
        .call(&json!({"request": "lava-send", "messageID": "ready", "message": "hello", "poll_delay": 2}))
        .await
        .unwrap();
    assert_eq!(reply, json!("ack"));
    let sent = service.requests();
    assert_eq!(sent[1]["request"], "lava_send");
    assert_eq!(sent[1]["message"], json!({"hello": null}));
    assert_eq!(sent[1]["poll_delay"], 2);
}

#[tokio::test]
async fn wait_all_forwards_the_role() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    protocol.set_up().await.unwrap();
    protocol
        .call(&json!({"request": "lava-wait-all", "messageID": "booted", "role": "server"}))
        .await
        .unwrap();
    protocol
        .call(&json!({"request": "lava-start", "messageID": "ignored"}))
        .await
        .unwrap();
    let sent = service.requests();
    assert_eq!(sent[1]["waitrole"], "server");
    assert_eq!(sent[2]["request"], "lava_send");
    assert_eq!(sent[2]["messageID"], "lava_start");
}

#[tokio::test]
async fn finalise_clears_the_group() {
    let service = FakeService::start(coordinator).await;
    let mut protocol = protocol(&service).await;
    protocol.set_up().await.unwrap();
    protocol
        .finalise_protocol(&DeviceConfig::default())
        .await
        .unwrap();
    let sent = service.requests();
    assert_eq!(sent.last().unwrap()["request"], "clear_group");
    let state = protocol.handle.session.lock().await.client.state();
    assert_eq!(state, ClientState::Disconnected);
}

#[tokio::test]
async fn debug_setup_targets_the_debug_port() {
    let mut settings = settings(1);
    settings.debug = true;
    let mut protocol = MultinodeProtocol::new(&parameters(block()), "4212.1", &settings).unwrap();
    protocol.set_up().await.unwrap();
    let session = protocol.handle.session.lock().await;
    assert_eq!(session.client.endpoint().1, 3179);
    assert_eq!(session.client.poll_delay(), Duration::from_secs(3));
    assert_eq!(session.base["client_name"], "4212.1");
}

#[tokio::test]
async fn unreachable_coordinator_is_retryable_after_reset() {
    let mut protocol =
        MultinodeProtocol::new(&parameters(block()), "4212.1", &settings(closed_port().await)).unwrap();
    let err = protocol.set_up().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(err.is_retryable());

    protocol.reset().await;
    let state = protocol.handle.session.lock().await.client.state();
    assert_eq!(state, ClientState::Disconnected);
}
