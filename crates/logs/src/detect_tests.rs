// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for error clustering and preferred code references.

use super::*;
use brum_core::{LogPriority, ProcessId};
use yare::parameterized;

fn detector() -> ErrorDetector {
    ErrorDetector::new(
        Duration::from_millis(500),
        vec!["node_modules/".to_string(), "internal/".to_string(), "vendor/".to_string()],
    )
}

fn entry(process: &str, text: &str) -> LogEntry {
    LogEntry {
        id: 0,
        process_id: ProcessId::from_string(process),
        process_name: process.to_string(),
        text: text.to_string(),
        timestamp: chrono::Utc::now(),
        is_error: false,
        priority: LogPriority::Normal,
        tags: Vec::new(),
    }
}

#[parameterized(
    plain_error = { "Error: boom", true },
    lowercase = { "error: something broke", true },
    rust_panic = { "thread 'main' panicked at src/main.rs:4:5:", true },
    go_panic = { "panic: runtime error: index out of range", true },
    python_traceback = { "Traceback (most recent call last):", true },
    npm = { "npm ERR! missing script: dev", true },
    colored = { "\x1b[31mError:\x1b[0m failed to compile", true },
    info_line = { "info: listening on 3000", false },
    plain_text = { "hello world", false },
)]
fn error_prefix_detection(line: &str, is_error: bool) {
    assert_eq!(detector().is_error_line(line), is_error);
}

#[test]
fn multi_line_stack_produces_one_cluster() {
    let mut det = detector();
    assert!(det.feed(&entry("dev-1", "Error: boom")).is_none());
    assert!(det.feed(&entry("dev-1", "    at handler (a.js:10:5)")).is_none());
    assert!(det.feed(&entry("dev-1", "    at run (node_modules/express/lib/router.js:3:1)")).is_none());

    let ctx = det.close().expect("open cluster");
    assert_eq!(ctx.root_message, "Error: boom");
    assert_eq!(ctx.frames.len(), 2);
    assert_eq!(ctx.code_reference.as_ref().map(|f| f.reference()).as_deref(), Some("a.js:10"));
    assert!(det.close().is_none(), "cluster closes once");
}

#[test]
fn vendor_frames_are_skipped_for_code_reference() {
    let mut det = detector();
    det.feed(&entry("dev-1", "Error: boom"));
    det.feed(&entry("dev-1", "    at wrap (node_modules/lib/w.js:1:1)"));
    det.feed(&entry("dev-1", "    at handler (src/app.js:42:3)"));
    det.feed(&entry("dev-1", "    at node:internal/process:7:2"));

    let ctx = det.close().expect("open cluster");
    assert_eq!(
        ctx.code_reference.expect("reference").reference(),
        "src/app.js:42"
    );
}

#[test]
fn line_from_other_process_closes_cluster() {
    let mut det = detector();
    det.feed(&entry("dev-1", "Error: boom"));
    det.feed(&entry("dev-1", "    at a (a.js:1:1)"));

    let closed = det.feed(&entry("build-1", "compiling"));
    let ctx = closed.expect("interleaved line closes cluster");
    assert_eq!(ctx.process_id, ProcessId::from_string("dev-1"));
}

#[test]
fn python_traceback_parses_frames_and_language() {
    let mut det = detector();
    det.feed(&entry("api-1", "Traceback (most recent call last):"));
    det.feed(&entry("api-1", "  File \"app.py\", line 12, in main"));
    det.feed(&entry("api-1", "ValueError: bad input"));

    let ctx = det.close().expect("open cluster");
    assert_eq!(ctx.language.as_deref(), Some("python"));
    let frame = ctx.code_reference.expect("reference");
    assert_eq!(frame.file, "app.py");
    assert_eq!(frame.line, Some(12));
    assert_eq!(frame.function.as_deref(), Some("main"));
}

#[test]
fn rust_diagnostic_reference() {
    let mut det = detector();
    det.feed(&entry("build-1", "error[E0308]: mismatched types"));
    det.feed(&entry("build-1", " --> src/lib.rs:7:9"));

    let ctx = det.close().expect("open cluster");
    assert_eq!(ctx.language.as_deref(), Some("rust"));
    assert_eq!(ctx.code_reference.expect("reference").reference(), "src/lib.rs:7");
}

#[test]
fn severity_fatal_for_panics() {
    let mut det = detector();
    det.feed(&entry("dev-1", "thread 'main' panicked at src/main.rs:4:5:"));
    let ctx = det.close().expect("open cluster");
    assert_eq!(ctx.severity, ErrorSeverity::Fatal);
}

#[test]
fn raw_preserves_all_lines() {
    let mut det = detector();
    det.feed(&entry("dev-1", "Error: one"));
    det.feed(&entry("dev-1", "detail line"));
    let ctx = det.close().expect("open cluster");
    assert_eq!(ctx.raw, "Error: one\ndetail line");
}

#[test]
fn strip_ansi_removes_color_codes() {
    assert_eq!(strip_ansi("\x1b[31mError\x1b[0m: x"), "Error: x");
    assert_eq!(strip_ansi("plain"), "plain");
}
