// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the capture ring and telemetry correlation.

use super::*;
use std::sync::Arc;

fn input(url: &str, status: u16) -> CaptureInput {
    CaptureInput {
        method: "GET".to_string(),
        url: url.to_string(),
        status,
        duration_ms: 12,
        request_size: 0,
        response_size: 64,
        headers: vec![
            ("Accept".to_string(), "text/html".to_string()),
            ("Cookie".to_string(), "secret=1".to_string()),
        ],
        body_excerpt: None,
        kind: RequestKind::Page,
    }
}

#[tokio::test]
async fn record_assigns_increasing_ids_and_bounds_ring() {
    let ledger = RequestLedger::new(3, EventBus::with_workers(1));
    for n in 0..5 {
        ledger.record(input(&format!("http://localhost:3000/p{n}"), 200));
    }
    let requests = ledger.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].url, "http://localhost:3000/p2");
    let ids: Vec<u64> = requests.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
}

#[tokio::test]
async fn only_selected_headers_are_kept() {
    let ledger = RequestLedger::new(10, EventBus::with_workers(1));
    let req = ledger.record(input("http://localhost:3000/", 200));
    assert!(req.headers.contains_key("accept"));
    assert!(!req.headers.contains_key("cookie"), "cookies never captured");
}

#[tokio::test]
async fn each_record_emits_one_proxy_request_event() {
    let bus = EventBus::with_workers(2);
    let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let clone = Arc::clone(&count);
    bus.subscribe(
        brum_core::EventKind::ProxyRequest,
        Arc::new(move |_| {
            clone.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }),
    );

    let ledger = RequestLedger::new(100, bus);
    for n in 0..20 {
        ledger.record(input(&format!("http://localhost:3000/{n}"), 200));
    }
    for _ in 0..100 {
        if count.load(std::sync::atomic::Ordering::Relaxed) == 20 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(count.load(std::sync::atomic::Ordering::Relaxed), 20);
}

#[tokio::test]
async fn correlate_backfills_most_recent_from_origin() {
    let ledger = RequestLedger::new(10, EventBus::with_workers(1));
    ledger.record(input("http://localhost:3000/a", 200));
    ledger.record(input("http://localhost:4000/b", 200));
    ledger.record(input("http://localhost:3000/c", 200));

    ledger.correlate("http://localhost:3000", "sess-1");

    let requests = ledger.requests();
    assert_eq!(requests[2].telemetry_session.as_deref(), Some("sess-1"));
    assert!(requests[0].telemetry_session.is_none(), "only the most recent is backfilled");
    assert!(requests[1].telemetry_session.is_none());

    // Later captures from that origin inherit the session.
    let next = ledger.record(input("http://localhost:3000/d", 200));
    assert_eq!(next.telemetry_session.as_deref(), Some("sess-1"));
}

#[test]
fn origin_extraction() {
    assert_eq!(origin_of("http://localhost:3000/a/b?q=1").as_deref(), Some("http://localhost:3000"));
    assert_eq!(origin_of("https://x.dev").as_deref(), Some("https://x.dev"));
    assert_eq!(origin_of("not a url"), None);
}
