// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for event serialization, kinds, and log summaries.

use super::*;
use crate::process::ProcessStatus;

#[test]
fn events_serialize_with_type_tag() {
    let event = Event::ProcessStarted {
        id: ProcessId::new("dev", 1),
        name: "dev".to_string(),
        command: "node server.js".to_string(),
        cwd: PathBuf::from("/work"),
        pid: Some(42),
    };
    let value: serde_json::Value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "process:started");
    assert_eq!(value["id"], "dev-1");
    assert_eq!(value["pid"], 42);
}

#[test]
fn unknown_type_deserializes_to_custom() {
    let event: Event = serde_json::from_str(r#"{"type":"weather:sunny"}"#).unwrap();
    assert_eq!(event, Event::Custom);
    assert_eq!(event.kind(), EventKind::Custom);
}

#[test]
fn kind_matches_name_prefix() {
    let event = Event::UrlDetected {
        process_id: ProcessId::new("dev", 1),
        url: "http://localhost:3000".to_string(),
        label: Some("Local".to_string()),
    };
    assert_eq!(event.kind(), EventKind::UrlDetected);
    assert_eq!(event.name(), "url:detected");
}

#[test]
fn log_summary_process_exited() {
    let event = Event::ProcessExited {
        id: ProcessId::new("build", 2),
        name: "build".to_string(),
        status: ProcessStatus::Failed,
        exit_code: Some(1),
        runtime_ms: 1500,
    };
    assert_eq!(event.log_summary(), "process:exited process=build-2 status=failed code=Some(1)");
}

#[test]
fn round_trip_log_line() {
    let event = Event::LogLine {
        process_id: ProcessId::new("dev", 1),
        process_name: "dev".to_string(),
        text: "info: listening".to_string(),
        is_error: false,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
