// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clustered error output extracted from process logs

use crate::process::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Warning,
    Error,
    Fatal,
}

/// One parsed stack frame from an error cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source path as printed by the runtime.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl StackFrame {
    /// `file:line` reference, the form tools and humans link on.
    pub fn reference(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{line}", self.file),
            None => self.file.clone(),
        }
    }
}

/// A cluster of consecutive error lines from one process.
///
/// Materialized by the detector when it closes a cluster; stored alongside
/// the log ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub process_id: ProcessId,
    pub process_name: String,
    /// First recognized error line, trimmed.
    pub root_message: String,
    /// Best-guess language or framework ("node", "python", "rust", "go", …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Deepest frame whose path is not under a vendor/runtime directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_reference: Option<StackFrame>,
    pub frames: Vec<StackFrame>,
    pub severity: ErrorSeverity,
    /// Full raw text of the cluster, newline-joined.
    pub raw: String,
    pub detected_at: DateTime<Utc>,
}
