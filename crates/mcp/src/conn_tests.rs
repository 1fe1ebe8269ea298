// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the peer state machine, retries, and session bindings.

use super::*;
use crate::test_support::{connector_for, descriptor, flaky_connector, FakeClient};

async fn wait_for_state(conn: &ConnectionManager, id: &str, state: PeerState) {
    for _ in 0..500 {
        let peers = conn.list().await;
        if peers.iter().any(|p| p.descriptor.id == id && p.state == state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let peers = conn.list().await;
    panic!("peer {id} never reached {state:?}; current: {peers:?}");
}

#[tokio::test(start_paused = true)]
async fn appeared_peer_becomes_active_with_client() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &["scripts/list"]);
    let conn = ConnectionManager::start(connector_for(client), 5, &cancel);

    let desc = descriptor("proj-a", 7801);
    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Active).await;

    let peers = conn.list().await;
    assert_eq!(peers.len(), 1);
    assert!(peers[0].has_client, "active peer has a live client");
    assert_eq!(peers[0].retries, 0);
    assert!(peers[0].connected_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn connect_failures_retry_with_backoff_then_succeed() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    let conn = ConnectionManager::start(flaky_connector(client, 2), 5, &cancel);

    let desc = descriptor("proj-a", 7802);
    conn.instance_appeared(desc.clone()).await;
    // Two failures, then success; paused time fast-forwards the backoff.
    wait_for_state(&conn, &desc.id, PeerState::Active).await;
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted_marks_peer_dead() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    // Fails far more often than the budget of 3.
    let conn = ConnectionManager::start(flaky_connector(client, 100), 3, &cancel);

    let desc = descriptor("proj-a", 7803);
    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Dead).await;

    let peers = conn.list().await;
    assert!(!peers[0].has_client, "dead peer has no client");
}

#[tokio::test(start_paused = true)]
async fn reappearance_resets_dead_peer() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    // Dead after 2 attempts, then the connector starts succeeding.
    let conn = ConnectionManager::start(flaky_connector(client, 2), 2, &cancel);

    let desc = descriptor("proj-a", 7804);
    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Dead).await;

    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Active).await;
}

#[tokio::test(start_paused = true)]
async fn session_binding_requires_active_peer() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    let conn = ConnectionManager::start(connector_for(client), 5, &cancel);

    let err = conn.connect_session("s1", "ghost").await.expect_err("unknown peer");
    assert_eq!(err.kind, ErrorKind::NotFound);

    let desc = descriptor("proj-a", 7805);
    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Active).await;

    conn.connect_session("s1", &desc.id).await.expect("bind to active peer");
    let (peer_id, _client) = conn.client_for_session("s1").await.expect("bound client");
    assert_eq!(peer_id, desc.id);

    // Idempotent disconnect.
    conn.disconnect_session("s1").await;
    conn.disconnect_session("s1").await;
    assert!(conn.client_for_session("s1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn each_session_maps_to_one_peer() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    let conn = ConnectionManager::start(connector_for(client), 5, &cancel);

    let a = descriptor("proj-a", 7806);
    let b = descriptor("proj-b", 7807);
    conn.instance_appeared(a.clone()).await;
    conn.instance_appeared(b.clone()).await;
    wait_for_state(&conn, &a.id, PeerState::Active).await;
    wait_for_state(&conn, &b.id, PeerState::Active).await;

    conn.connect_session("s1", &a.id).await.expect("bind a");
    conn.connect_session("s1", &b.id).await.expect("rebind b");

    let peers = conn.list().await;
    let bound: Vec<&PeerSnapshot> =
        peers.iter().filter(|p| p.sessions.contains(&"s1".to_string())).collect();
    assert_eq!(bound.len(), 1, "session bound to exactly one peer");
    assert_eq!(bound[0].descriptor.id, b.id);
}

#[tokio::test(start_paused = true)]
async fn demotion_unbinds_sessions_before_next_dispatch() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    let conn = ConnectionManager::start(connector_for(client), 5, &cancel);

    let desc = descriptor("proj-a", 7808);
    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Active).await;
    conn.connect_session("s1", &desc.id).await.expect("bind");

    conn.mark_unhealthy(&desc.id, "ping timed out").await;

    // The owner task serializes: after demotion, the binding is gone.
    assert!(conn.client_for_session("s1").await.is_none());
    let peers = conn.list().await;
    assert_eq!(peers[0].state, PeerState::Retrying);
    assert!(!peers[0].has_client);
    assert!(peers[0].sessions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_instance_is_removed() {
    let cancel = CancellationToken::new();
    let client = FakeClient::new("a", &[]);
    let conn = ConnectionManager::start(connector_for(client), 5, &cancel);

    let desc = descriptor("proj-a", 7809);
    conn.instance_appeared(desc.clone()).await;
    wait_for_state(&conn, &desc.id, PeerState::Active).await;
    conn.connect_session("s1", &desc.id).await.expect("bind");

    conn.instance_lost(desc.id.clone()).await;
    assert!(conn.list().await.is_empty());
    assert!(conn.client_for_session("s1").await.is_none());
}

#[test]
fn backoff_grows_and_caps() {
    assert_eq!(backoff(1), Duration::from_secs(1));
    assert_eq!(backoff(2), Duration::from_secs(2));
    assert_eq!(backoff(3), Duration::from_secs(4));
    assert_eq!(backoff(6), Duration::from_secs(30), "capped at 30s");
    assert_eq!(backoff(30), Duration::from_secs(30));
}
