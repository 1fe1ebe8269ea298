// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for session creation, expiry, and resource notifications.

use super::*;

#[tokio::test]
async fn resolve_creates_and_reuses_sessions() {
    let manager = SessionManager::new(Duration::from_secs(60));
    let id = manager.resolve(None);
    assert!(manager.contains(&id));

    let same = manager.resolve(Some(&id));
    assert_eq!(same, id);
    assert_eq!(manager.len(), 1);

    // Unknown presented id is adopted as a fresh session.
    let other = manager.resolve(Some("client-chosen"));
    assert_eq!(other, "client-chosen");
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn notifications_reach_only_subscribed_sessions() {
    let manager = SessionManager::new(Duration::from_secs(60));
    let a = manager.resolve(None);
    let b = manager.resolve(None);

    let mut stream_a = manager.attach_stream(&a);
    let mut stream_b = manager.attach_stream(&b);
    assert!(manager.subscribe(&a, "logs://recent"));

    manager.notify_resource_updated("logs://recent");

    let note = stream_a.try_recv().expect("subscribed session notified");
    assert_eq!(note.method, brum_wire::NOTIFICATION_RESOURCE_UPDATED);
    assert!(stream_b.try_recv().is_err(), "unsubscribed session stays quiet");
}

#[tokio::test]
async fn subscribe_to_unknown_session_fails() {
    let manager = SessionManager::new(Duration::from_secs(60));
    assert!(!manager.subscribe("ghost", "logs://recent"));
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_expire() {
    let manager = SessionManager::new(Duration::from_millis(100));
    let cancel = CancellationToken::new();
    manager.start_sweeper(&cancel);

    let id = manager.resolve(None);
    assert!(manager.contains(&id));

    // Paused-time test: advance well past the idle timeout and sweep period.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!manager.contains(&id), "idle session swept");
    cancel.cancel();
}

#[tokio::test]
async fn remove_drops_stream() {
    let manager = SessionManager::new(Duration::from_secs(60));
    let id = manager.resolve(None);
    let mut stream = manager.attach_stream(&id);
    assert!(manager.remove(&id));
    assert!(!manager.remove(&id));
    // Sender dropped with the session; the stream ends.
    assert!(stream.recv().await.is_none());
}
