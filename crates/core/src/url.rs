// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! URLs observed in process output

use crate::process::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A URL extracted from a log line, deduplicated per (process, url).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub url: String,
    pub process_id: ProcessId,
    pub first_seen: DateTime<Utc>,
    /// Short label derived from the surrounding line ("Local", "Network", …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
