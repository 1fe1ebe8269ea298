// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenarios crossing crate boundaries: a supervised
//! process streaming into the log store through the bus, with error
//! extraction on top.

use brum_bus::EventBus;
use brum_core::{Config, Event, EventKind, LogFilter, ProcessStatus};
use brum_logs::LogStore;
use brum_supervisor::{LogSink, Supervisor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn wired() -> (EventBus, Arc<LogStore>, Supervisor) {
    let bus = EventBus::with_workers(4);
    let config = Config::default();
    let logs = LogStore::new(&config, bus.clone());
    let sink_logs = Arc::clone(&logs);
    let sink: LogSink = Arc::new(move |id, name, line, is_error| {
        sink_logs.add(id.clone(), name, line, is_error);
    });
    let supervisor = Supervisor::new(
        bus.clone(),
        sink,
        Vec::new(),
        Duration::from_secs(5),
        2048,
    );
    (bus, logs, supervisor)
}

async fn wait_terminal(sup: &Supervisor, id: &brum_core::ProcessId) -> ProcessStatus {
    let mut rx = sup.watch_status(id).expect("known process");
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = *rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    })
    .await
    .expect("terminal status")
}

#[tokio::test]
async fn script_output_flows_into_store_and_search() {
    let (_bus, logs, sup) = wired();
    let outcome = sup
        .start(
            "dev",
            "echo 'info: hello'; echo 'Error: boom'; echo '  at handler (a.js:10:3)'",
            std::env::temp_dir(),
        )
        .expect("spawn");
    let status = wait_terminal(&sup, &outcome.record.id).await;
    assert_eq!(status, ProcessStatus::Success);

    // Intake is asynchronous; wait for all three lines.
    for _ in 0..500 {
        if logs.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let hits = logs.search("boom", None, None).expect("pattern");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].process_id, outcome.record.id);
    assert!(hits[0].is_error);

    logs.flush_errors();
    let contexts = logs.get_error_contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(
        contexts[0].code_reference.as_ref().map(|f| f.reference()).as_deref(),
        Some("a.js:10")
    );
}

#[tokio::test]
async fn url_in_output_emits_single_detection_event() {
    let (bus, logs, sup) = wired();
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let clone = Arc::clone(&seen);
    bus.subscribe(
        EventKind::UrlDetected,
        Arc::new(move |event| {
            if let Event::UrlDetected { url, .. } = event {
                clone.lock().push(url.clone());
            }
        }),
    );

    let outcome = sup
        .start(
            "dev",
            "echo 'Local: http://localhost:3000'; echo 'again http://localhost:3000'",
            std::env::temp_dir(),
        )
        .expect("spawn");
    wait_terminal(&sup, &outcome.record.id).await;

    for _ in 0..500 {
        if logs.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(seen.lock().clone(), vec!["http://localhost:3000".to_string()]);
}

#[tokio::test]
async fn live_subscription_sees_process_errors() {
    let (_bus, logs, sup) = wired();
    let mut stream = logs.subscribe(LogFilter { errors_only: true, ..LogFilter::default() });

    sup.start("dev", "echo fine; echo 'Error: bad' 1>&2", std::env::temp_dir())
        .expect("spawn");

    let entry = tokio::time::timeout(Duration::from_secs(10), stream.recv())
        .await
        .expect("entry within deadline")
        .expect("store alive");
    assert!(entry.is_error);
    assert_eq!(entry.text, "Error: bad");
}

#[tokio::test]
async fn stopped_process_reports_exit_event() {
    let (bus, _logs, sup) = wired();
    let exits = Arc::new(Mutex::new(Vec::<(String, ProcessStatus)>::new()));
    let clone = Arc::clone(&exits);
    bus.subscribe(
        EventKind::ProcessExited,
        Arc::new(move |event| {
            if let Event::ProcessExited { id, status, .. } = event {
                clone.lock().push((id.to_string(), *status));
            }
        }),
    );

    let outcome = sup.start("dev", "sleep 30", std::env::temp_dir()).expect("spawn");
    let record = sup.stop(&outcome.record.id).await.expect("stop");
    assert_eq!(record.status, ProcessStatus::Stopped);

    for _ in 0..500 {
        if !exits.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let exits = exits.lock().clone();
    assert_eq!(exits, vec![(outcome.record.id.to_string(), ProcessStatus::Stopped)]);
}
