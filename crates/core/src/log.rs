// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entries as stored in the ring

use crate::process::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority derived from error detection at intake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogPriority {
    Normal,
    Warning,
    Error,
}

/// Category tags attached at intake (build output, test output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTag {
    Build,
    Test,
}

/// One captured output line. Append-only; evicted only by ring rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing within a store instance.
    pub id: u64,
    pub process_id: ProcessId,
    pub process_name: String,
    /// Captured text: framing bytes stripped, ANSI sequences preserved.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_error: bool,
    pub priority: LogPriority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<LogTag>,
}

/// Filter for live log subscriptions.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Only entries from this process.
    pub process: Option<ProcessId>,
    /// Only entries flagged as errors.
    pub errors_only: bool,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.errors_only && !entry.is_error {
            return false;
        }
        match &self.process {
            Some(p) => *p == entry.process_id,
            None => true,
        }
    }
}
