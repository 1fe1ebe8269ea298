// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process identity, status, and lifecycle records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier for a supervised process: `<script>-<monotonic>`.
///
/// The monotonic suffix is assigned by the supervisor so repeated runs of
/// the same script stay distinguishable for their whole queryable lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(script: &str, seq: u64) -> Self {
        Self(format!("{script}-{seq}"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The script portion of the id (everything before the last `-`).
    pub fn script(&self) -> &str {
        self.0.rsplit_once('-').map_or(self.0.as_str(), |(s, _)| s)
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProcessId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a supervised process.
///
/// The only legal path is `Pending → Running → {Success, Failed, Stopped}`;
/// a terminal value is set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Pending,
    Running,
    Success,
    Failed,
    Stopped,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Stopped)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Running, s) if s.is_terminal() => true,
            // Spawn failures go straight from pending to failed.
            (Self::Pending, Self::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a supervised process. Created at `start`, never deleted while
/// the supervisor lives; terminal records remain queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    /// Human display name (usually the script name).
    pub name: String,
    /// Full command line as launched.
    pub command: String,
    pub cwd: PathBuf,
    /// OS pid, present once spawned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ProcessRecord {
    pub fn new(id: ProcessId, name: &str, command: &str, cwd: PathBuf) -> Self {
        Self {
            id,
            name: name.to_string(),
            command: command.to_string(),
            cwd,
            pid: None,
            status: ProcessStatus::Pending,
            started_at: Utc::now(),
            exited_at: None,
            exit_code: None,
        }
    }

    /// Wall time from start to exit, in milliseconds. Zero until exited.
    pub fn runtime_ms(&self) -> u64 {
        self.exited_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
