// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for hub tool merging and peer routing.

use super::*;
use crate::conn::PeerState;
use crate::test_support::{connector_for, descriptor, FakeClient};
use brum_wire::RequestId;
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn active_peer(
    conn: &ConnectionManager,
    client: Arc<FakeClient>,
) -> brum_core::InstanceDescriptor {
    let desc = descriptor(&client.name.clone(), 7900);
    conn.instance_appeared(desc.clone()).await;
    for _ in 0..500 {
        if conn.list().await.iter().any(|p| p.state == PeerState::Active) {
            return desc;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("peer never became active");
}

fn request(method: &str, params: Option<serde_json::Value>) -> JsonRpcRequest {
    JsonRpcRequest::new(RequestId::Number(1), method, params)
}

fn hub_with_peer() -> (Arc<HubServer>, ConnectionManager, Arc<FakeClient>) {
    let cancel = CancellationToken::new();
    // Peer carries a colliding instances/list plus its own tools.
    let client = FakeClient::new("peer-a", &["scripts/list", "instances/list"]);
    let conn = ConnectionManager::start(connector_for(Arc::clone(&client)), 5, &cancel);
    let hub = HubServer::new(conn.clone(), brum_bus::EventBus::with_workers(2), "0.0.0");
    (hub, conn, client)
}

#[tokio::test(start_paused = true)]
async fn unbound_session_sees_only_hub_tools() {
    let (hub, _conn, _client) = hub_with_peer();
    let (tx, _rx) = mpsc::channel(8);
    let resp = hub
        .handle(hub.session_id(), request(METHOD_TOOLS_LIST, None), &tx)
        .await
        .expect("response");
    let tools = resp.result.expect("result")["tools"].clone();
    let names: Vec<String> = tools
        .as_array()
        .expect("array")
        .iter()
        .map(|t| t["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            HUB_TOOL_CONNECT.to_string(),
            HUB_TOOL_DISCONNECT.to_string(),
            HUB_TOOL_LIST.to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn peer_call_without_binding_is_not_connected() {
    let (hub, _conn, _client) = hub_with_peer();
    let (tx, _rx) = mpsc::channel(8);
    let resp = hub
        .handle(
            hub.session_id(),
            request(METHOD_TOOLS_CALL, Some(json!({"name": "scripts/list", "arguments": {}}))),
            &tx,
        )
        .await
        .expect("response");
    assert_eq!(resp.error.expect("error").code, ErrorKind::NotConnected.code());
}

#[tokio::test(start_paused = true)]
async fn connect_merges_peer_tools_with_hub_precedence() {
    let (hub, conn, _client) = hub_with_peer();
    let desc = active_peer(&conn, _client.clone()).await;

    let (tx, _rx) = mpsc::channel(8);
    let resp = hub
        .handle(
            hub.session_id(),
            request(
                METHOD_TOOLS_CALL,
                Some(json!({"name": HUB_TOOL_CONNECT, "arguments": {"instance_id": desc.id}})),
            ),
            &tx,
        )
        .await
        .expect("response");
    assert!(resp.error.is_none(), "connect succeeded: {resp:?}");

    let resp = hub
        .handle(hub.session_id(), request(METHOD_TOOLS_LIST, None), &tx)
        .await
        .expect("response");
    let tools = resp.result.expect("result")["tools"].clone();
    let tools = tools.as_array().expect("array");

    let instances_list: Vec<_> =
        tools.iter().filter(|t| t["name"] == HUB_TOOL_LIST).collect();
    assert_eq!(instances_list.len(), 1, "hub tool wins the name collision");
    assert_ne!(
        instances_list[0]["description"].as_str().unwrap_or_default(),
        "peer tool on peer-a",
        "merged entry is the hub's, not the peer's"
    );
    assert!(tools.iter().any(|t| t["name"] == "scripts/list"), "peer tool merged in");
}

#[tokio::test(start_paused = true)]
async fn bound_session_routes_peer_tools_to_peer() {
    let (hub, conn, client) = hub_with_peer();
    let desc = active_peer(&conn, client.clone()).await;
    conn.connect_session(hub.session_id(), &desc.id).await.expect("bind");

    let (tx, _rx) = mpsc::channel(8);
    let resp = hub
        .handle(
            hub.session_id(),
            request(
                METHOD_TOOLS_CALL,
                Some(json!({"name": "scripts/list", "arguments": {"verbose": true}})),
            ),
            &tx,
        )
        .await
        .expect("response");
    let result = resp.result.expect("result");
    let payload: serde_json::Value =
        serde_json::from_str(result["content"][0]["text"].as_str().expect("text"))
            .expect("payload json");
    assert_eq!(payload["peer"], "peer-a");
    assert_eq!(payload["tool"], "scripts/list");
    assert_eq!(payload["args"]["verbose"], true);
    assert_eq!(client.calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn instances_list_tool_reports_state_and_disconnect_unbinds() {
    let (hub, conn, client) = hub_with_peer();
    let desc = active_peer(&conn, client).await;

    let (tx, _rx) = mpsc::channel(8);
    let resp = hub
        .handle(
            hub.session_id(),
            request(METHOD_TOOLS_CALL, Some(json!({"name": HUB_TOOL_LIST, "arguments": {}}))),
            &tx,
        )
        .await
        .expect("response");
    let result = resp.result.expect("result");
    let peers: serde_json::Value =
        serde_json::from_str(result["content"][0]["text"].as_str().expect("text"))
            .expect("peers json");
    assert_eq!(peers[0]["state"], "active");
    assert_eq!(peers[0]["descriptor"]["id"], json!(desc.id));

    conn.connect_session(hub.session_id(), &desc.id).await.expect("bind");
    let resp = hub
        .handle(
            hub.session_id(),
            request(METHOD_TOOLS_CALL, Some(json!({"name": HUB_TOOL_DISCONNECT, "arguments": {}}))),
            &tx,
        )
        .await
        .expect("response");
    assert!(resp.error.is_none());
    assert!(conn.client_for_session(hub.session_id()).await.is_none());

    // After disconnect, peer tools fail again.
    let resp = hub
        .handle(
            hub.session_id(),
            request(METHOD_TOOLS_CALL, Some(json!({"name": "scripts/list", "arguments": {}}))),
            &tx,
        )
        .await
        .expect("response");
    assert_eq!(resp.error.expect("error").code, ErrorKind::NotConnected.code());
}
