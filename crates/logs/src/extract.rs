// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! URL extraction and build/test line classification

use brum_core::{LogTag, ProcessId, UrlEntry};
use regex::Regex;
use std::collections::HashSet;

/// Extracts http(s) URLs from log lines, deduplicated per (process, url).
pub struct UrlExtractor {
    pattern: Regex,
    seen: HashSet<(ProcessId, String)>,
}

impl UrlExtractor {
    // Pattern is a literal; construction cannot fail.
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r#"https?://[^\s"'<>\)\]]+"#).unwrap(),
            seen: HashSet::new(),
        }
    }

    /// Extract URLs not yet seen for this process.
    pub fn extract(&mut self, process_id: &ProcessId, text: &str) -> Vec<UrlEntry> {
        let clean = super::detect::strip_ansi(text);
        let mut out = Vec::new();
        for m in self.pattern.find_iter(&clean) {
            let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
            let key = (process_id.clone(), url.clone());
            if self.seen.contains(&key) {
                continue;
            }
            self.seen.insert(key);
            out.push(UrlEntry {
                url,
                process_id: process_id.clone(),
                first_seen: chrono::Utc::now(),
                label: label_for(&clean),
            });
        }
        out
    }

    /// Forget a process's URLs so a restart re-announces them.
    pub fn forget(&mut self, process_id: &ProcessId) {
        self.seen.retain(|(p, _)| p != process_id);
    }
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn label_for(line: &str) -> Option<String> {
    let lower = line.to_lowercase();
    if lower.contains("local:") {
        Some("Local".to_string())
    } else if lower.contains("network:") {
        Some("Network".to_string())
    } else if lower.contains("preview") {
        Some("Preview".to_string())
    } else {
        None
    }
}

/// Coarse classification of a line for tagging and derived events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Build,
    TestStarted(Option<String>),
    TestPassed(Option<String>),
    TestFailed(Option<String>),
    Plain,
}

impl LineClass {
    pub fn of(text: &str) -> Self {
        let clean = super::detect::strip_ansi(text);
        let trimmed = clean.trim_start();

        if let Some(rest) = trimmed.strip_prefix("PASS ") {
            return Self::TestPassed(Some(rest.trim().to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("FAIL ") {
            return Self::TestFailed(Some(rest.trim().to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("RUNS ") {
            return Self::TestStarted(Some(rest.trim().to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("✓ ") {
            return Self::TestPassed(Some(rest.trim().to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("✗ ") {
            return Self::TestFailed(Some(rest.trim().to_string()));
        }
        if trimmed.starts_with("ok ") && trimmed.contains("test") {
            return Self::TestPassed(None);
        }

        let lower = trimmed.to_lowercase();
        if lower.starts_with("compiled")
            || lower.starts_with("compiling")
            || lower.starts_with("building")
            || lower.starts_with("build ")
            || lower.contains("webpack")
            || lower.contains("bundled")
        {
            return Self::Build;
        }

        Self::Plain
    }

    pub fn tag(&self) -> Option<LogTag> {
        match self {
            Self::Build => Some(LogTag::Build),
            Self::TestStarted(_) | Self::TestPassed(_) | Self::TestFailed(_) => Some(LogTag::Test),
            Self::Plain => None,
        }
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
