// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for URL extraction dedup and line classification.

use super::*;
use yare::parameterized;

#[test]
fn extracts_url_once_per_process() {
    let mut ex = UrlExtractor::new();
    let dev = ProcessId::from_string("dev-1");

    let first = ex.extract(&dev, "Local: http://localhost:3000");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].url, "http://localhost:3000");
    assert_eq!(first[0].label.as_deref(), Some("Local"));

    let again = ex.extract(&dev, "ready at http://localhost:3000");
    assert!(again.is_empty(), "dedup per (process, url)");

    let other = ex.extract(&ProcessId::from_string("dev-2"), "http://localhost:3000");
    assert_eq!(other.len(), 1, "other processes see the url fresh");
}

#[test]
fn trailing_punctuation_is_trimmed() {
    let mut ex = UrlExtractor::new();
    let urls = ex.extract(&ProcessId::from_string("dev-1"), "see https://example.com/docs.");
    assert_eq!(urls[0].url, "https://example.com/docs");
}

#[test]
fn ansi_wrapped_urls_are_found() {
    let mut ex = UrlExtractor::new();
    let urls = ex.extract(
        &ProcessId::from_string("dev-1"),
        "\x1b[32mLocal:\x1b[0m \x1b[36mhttp://localhost:5173/\x1b[0m",
    );
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "http://localhost:5173/");
}

#[test]
fn forget_allows_reannounce_after_restart() {
    let mut ex = UrlExtractor::new();
    let dev = ProcessId::from_string("dev-1");
    assert_eq!(ex.extract(&dev, "http://localhost:3000").len(), 1);
    ex.forget(&dev);
    assert_eq!(ex.extract(&dev, "http://localhost:3000").len(), 1);
}

#[parameterized(
    jest_pass = { "PASS src/app.test.js", LineClass::TestPassed(Some("src/app.test.js".into())) },
    jest_fail = { "FAIL src/app.test.js", LineClass::TestFailed(Some("src/app.test.js".into())) },
    jest_runs = { "RUNS src/app.test.js", LineClass::TestStarted(Some("src/app.test.js".into())) },
    check_pass = { "✓ renders header", LineClass::TestPassed(Some("renders header".into())) },
    check_fail = { "✗ renders footer", LineClass::TestFailed(Some("renders footer".into())) },
    build_compiled = { "Compiled successfully in 1.2s", LineClass::Build },
    build_webpack = { "webpack 5.90 compiled with 1 warning", LineClass::Build },
    plain = { "listening on port 3000", LineClass::Plain },
)]
fn line_classification(line: &str, expected: LineClass) {
    assert_eq!(LineClass::of(line), expected);
}

#[test]
fn tags_follow_class() {
    assert_eq!(LineClass::Build.tag(), Some(brum_core::LogTag::Build));
    assert_eq!(LineClass::TestPassed(None).tag(), Some(brum_core::LogTag::Test));
    assert_eq!(LineClass::Plain.tag(), None);
}
