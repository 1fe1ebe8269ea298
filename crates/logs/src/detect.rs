// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateful error-cluster detection
//!
//! Groups consecutive entries from one process within a configurable time
//! gap, starting at a line that matches the error prefix set. A cluster
//! closes on gap expiry, on a non-error line from another process, or on an
//! explicit flush, and materializes as an [`ErrorContext`].

use brum_core::{ErrorContext, ErrorSeverity, LogEntry, ProcessId, StackFrame};
use regex::Regex;
use std::time::{Duration, Instant};

/// Lazily-built regex set shared by the detector and line classification.
pub(crate) struct Patterns {
    pub error_prefix: Regex,
    pub warning_prefix: Regex,
    node_frame: Regex,
    python_frame: Regex,
    rust_frame: Regex,
    go_frame: Regex,
}

impl Patterns {
    // Patterns are literals; construction cannot fail (covered by tests).
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        // Prefixes may be preceded by ANSI color sequences.
        let ansi = r"(?:\x1b\[[0-9;]*m)*";
        Self {
            error_prefix: Regex::new(&format!(
                r"(?i)^{ansi}\s*(?:error[:\s]|panic(?:ked at|:)|exception|traceback|npm err!|unhandled|uncaught|fatal[:\s]|✗|fail(?:ed)?[:\s])"
            ))
            .unwrap(),
            warning_prefix: Regex::new(&format!(r"(?i)^{ansi}\s*warn(?:ing)?[:\s]")).unwrap(),
            node_frame: Regex::new(
                r"^\s+at\s+(?:(?P<func>[^\s(]+)\s+\()?(?P<file>[^():\s][^():]*?):(?P<line>\d+):(?P<col>\d+)\)?\s*$",
            )
            .unwrap(),
            python_frame: Regex::new(
                r#"^\s*File "(?P<file>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>\S+))?"#,
            )
            .unwrap(),
            rust_frame: Regex::new(r"^\s*-->\s*(?P<file>[^:]+):(?P<line>\d+):(?P<col>\d+)")
                .unwrap(),
            go_frame: Regex::new(r"^\s+(?P<file>\S+\.go):(?P<line>\d+)").unwrap(),
        }
    }
}

struct Cluster {
    process_id: ProcessId,
    process_name: String,
    lines: Vec<String>,
    opened_at: chrono::DateTime<chrono::Utc>,
    last_line: Instant,
}

/// Clusters error lines into [`ErrorContext`] values.
pub struct ErrorDetector {
    patterns: Patterns,
    gap: Duration,
    vendor_paths: Vec<String>,
    open: Option<Cluster>,
}

impl ErrorDetector {
    pub fn new(gap: Duration, vendor_paths: Vec<String>) -> Self {
        Self { patterns: Patterns::new(), gap, vendor_paths, open: None }
    }

    /// Whether a line opens an error cluster.
    pub fn is_error_line(&self, text: &str) -> bool {
        self.patterns.error_prefix.is_match(text)
    }

    pub fn is_warning_line(&self, text: &str) -> bool {
        self.patterns.warning_prefix.is_match(text)
    }

    /// Feed one entry; returns a closed cluster if this entry ended one.
    pub fn feed(&mut self, entry: &LogEntry) -> Option<ErrorContext> {
        let now = Instant::now();
        let mut closed = None;

        if let Some(cluster) = &mut self.open {
            let same_process = cluster.process_id == entry.process_id;
            let expired = now.duration_since(cluster.last_line) > self.gap;
            if same_process && !expired {
                cluster.lines.push(entry.text.clone());
                cluster.last_line = now;
                return None;
            }
            // Gap expired, or another process interleaved a line.
            closed = self.close();
        }

        if self.is_error_line(&entry.text) {
            self.open = Some(Cluster {
                process_id: entry.process_id.clone(),
                process_name: entry.process_name.clone(),
                lines: vec![entry.text.clone()],
                opened_at: entry.timestamp,
                last_line: now,
            });
        }

        closed
    }

    /// Instant at which the open cluster expires, for the intake worker's
    /// flush timer.
    pub fn deadline(&self) -> Option<Instant> {
        self.open.as_ref().map(|c| c.last_line + self.gap)
    }

    /// Close the open cluster if its gap has expired.
    pub fn flush_expired(&mut self) -> Option<ErrorContext> {
        let expired = self
            .open
            .as_ref()
            .is_some_and(|c| Instant::now().duration_since(c.last_line) > self.gap);
        if expired {
            self.close()
        } else {
            None
        }
    }

    /// Close the open cluster unconditionally.
    pub fn close(&mut self) -> Option<ErrorContext> {
        let cluster = self.open.take()?;
        Some(self.materialize(cluster))
    }

    fn materialize(&self, cluster: Cluster) -> ErrorContext {
        let mut frames = Vec::new();
        let mut language = None;

        for line in &cluster.lines {
            if let Some((frame, lang)) = self.parse_frame(line) {
                language.get_or_insert(lang);
                frames.push(frame);
            }
        }
        if language.is_none() {
            language = guess_language_from_message(&cluster.lines[0]);
        }

        // Preferred reference: deepest frame not under a vendor/runtime path.
        // Stacks list the innermost frame first, so take the first match.
        let code_reference = frames
            .iter()
            .find(|f| !self.is_vendor_path(&f.file))
            .cloned();

        let root = strip_ansi(&cluster.lines[0]).trim().to_string();
        let severity = if root.to_lowercase().contains("panic") || root.contains("FATAL") {
            ErrorSeverity::Fatal
        } else if self.patterns.warning_prefix.is_match(&cluster.lines[0]) {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        };

        ErrorContext {
            process_id: cluster.process_id,
            process_name: cluster.process_name,
            root_message: root,
            language: language.map(String::from),
            code_reference,
            raw: cluster.lines.join("\n"),
            frames,
            severity,
            detected_at: cluster.opened_at,
        }
    }

    fn parse_frame(&self, line: &str) -> Option<(StackFrame, &'static str)> {
        let line = strip_ansi(line);
        if let Some(caps) = self.patterns.python_frame.captures(&line) {
            return Some((
                StackFrame {
                    file: caps["file"].to_string(),
                    line: caps["line"].parse().ok(),
                    column: None,
                    function: caps.name("func").map(|m| m.as_str().to_string()),
                },
                "python",
            ));
        }
        if let Some(caps) = self.patterns.rust_frame.captures(&line) {
            return Some((
                StackFrame {
                    file: caps["file"].to_string(),
                    line: caps["line"].parse().ok(),
                    column: caps["col"].parse().ok(),
                    function: None,
                },
                "rust",
            ));
        }
        if let Some(caps) = self.patterns.node_frame.captures(&line) {
            let file = caps["file"].to_string();
            let lang = if file.ends_with(".go") { "go" } else { "node" };
            return Some((
                StackFrame {
                    file,
                    line: caps["line"].parse().ok(),
                    column: caps["col"].parse().ok(),
                    function: caps.name("func").map(|m| m.as_str().to_string()),
                },
                lang,
            ));
        }
        if let Some(caps) = self.patterns.go_frame.captures(&line) {
            return Some((
                StackFrame {
                    file: caps["file"].to_string(),
                    line: caps["line"].parse().ok(),
                    column: None,
                    function: None,
                },
                "go",
            ));
        }
        None
    }

    fn is_vendor_path(&self, path: &str) -> bool {
        self.vendor_paths.iter().any(|v| path.contains(v.as_str()))
    }
}

fn guess_language_from_message(line: &str) -> Option<&'static str> {
    let lower = line.to_lowercase();
    if lower.contains("traceback") {
        Some("python")
    } else if lower.contains("panicked at") {
        Some("rust")
    } else if lower.contains("goroutine") || lower.contains("panic:") {
        Some("go")
    } else if lower.contains("unhandledpromise") || lower.contains("referenceerror") {
        Some("node")
    } else {
        None
    }
}

/// Remove ANSI `ESC [ … m` color sequences for parsing; storage keeps them.
pub(crate) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for f in chars.by_ref() {
                if f.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
