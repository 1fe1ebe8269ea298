// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance descriptors exchanged through the discovery directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Pid and executable of the instance process, for liveness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub executable: PathBuf,
}

/// What the discovery layer writes to and reads from disk.
///
/// Serialized as `<runtime-dir>/brummer/instances/<id>.json`, written
/// atomically (temp + fsync + rename).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Random 128-bit id, hex.
    pub id: String,
    /// Project basename.
    pub name: String,
    /// Absolute project directory.
    pub directory: PathBuf,
    /// Tool-server port.
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub process_info: ProcessInfo,
}

impl InstanceDescriptor {
    pub fn new(name: &str, directory: PathBuf, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            directory,
            port,
            started_at: now,
            last_seen: now,
            process_info: ProcessInfo {
                pid: std::process::id(),
                executable: std::env::current_exe().unwrap_or_default(),
            },
        }
    }

    /// Whether `last_seen` is older than `threshold_secs`.
    pub fn is_stale(&self, threshold_secs: u64) -> bool {
        let age = Utc::now() - self.last_seen;
        age.num_seconds() > threshold_secs as i64
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
