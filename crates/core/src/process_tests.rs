// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for process status transitions and id formatting.

use super::*;
use yare::parameterized;

#[test]
fn id_format_is_script_dash_seq() {
    let id = ProcessId::new("dev", 3);
    assert_eq!(id.as_str(), "dev-3");
    assert_eq!(id.script(), "dev");
}

#[test]
fn id_script_handles_dashes_in_name() {
    let id = ProcessId::new("build-watch", 12);
    assert_eq!(id.as_str(), "build-watch-12");
    assert_eq!(id.script(), "build-watch");
}

#[parameterized(
    pending_to_running = { ProcessStatus::Pending, ProcessStatus::Running, true },
    pending_to_failed = { ProcessStatus::Pending, ProcessStatus::Failed, true },
    pending_to_success = { ProcessStatus::Pending, ProcessStatus::Success, false },
    running_to_success = { ProcessStatus::Running, ProcessStatus::Success, true },
    running_to_failed = { ProcessStatus::Running, ProcessStatus::Failed, true },
    running_to_stopped = { ProcessStatus::Running, ProcessStatus::Stopped, true },
    running_to_pending = { ProcessStatus::Running, ProcessStatus::Pending, false },
    success_to_running = { ProcessStatus::Success, ProcessStatus::Running, false },
    stopped_to_failed = { ProcessStatus::Stopped, ProcessStatus::Failed, false },
)]
fn status_transitions(from: ProcessStatus, to: ProcessStatus, legal: bool) {
    assert_eq!(from.can_transition_to(to), legal);
}

#[test]
fn terminal_statuses() {
    assert!(!ProcessStatus::Pending.is_terminal());
    assert!(!ProcessStatus::Running.is_terminal());
    assert!(ProcessStatus::Success.is_terminal());
    assert!(ProcessStatus::Failed.is_terminal());
    assert!(ProcessStatus::Stopped.is_terminal());
}

#[test]
fn record_runtime_is_zero_until_exit() {
    let rec = ProcessRecord::new(ProcessId::new("dev", 1), "dev", "node server.js", "/tmp".into());
    assert_eq!(rec.runtime_ms(), 0);
    assert_eq!(rec.status, ProcessStatus::Pending);
    assert!(rec.pid.is_none());
}

#[test]
fn status_serializes_lowercase() {
    let json = serde_json::to_string(&ProcessStatus::Running).unwrap();
    assert_eq!(json, "\"running\"");
}
