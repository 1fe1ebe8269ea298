// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types flowing through the bus
//!
//! Serializes with `{"type": "noun:verb", ...fields}` format. Unknown type
//! tags deserialize to `Custom`.

use crate::error_context::ErrorContext;
use crate::process::{ProcessId, ProcessStatus};
use crate::proxy::ProxyRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Closed set of event kinds, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProcessStarted,
    ProcessExited,
    LogLine,
    ErrorDetected,
    BuildEvent,
    TestStarted,
    TestPassed,
    TestFailed,
    UrlDetected,
    ProxyRequest,
    McpConnected,
    McpActivity,
    McpDisconnected,
    SystemMessage,
    Custom,
}

/// Events fanned out to subscribers. Value-typed; subscribers receive a
/// snapshot and must not retain references into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- process --
    #[serde(rename = "process:started")]
    ProcessStarted {
        id: ProcessId,
        name: String,
        command: String,
        cwd: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },

    #[serde(rename = "process:exited")]
    ProcessExited {
        id: ProcessId,
        name: String,
        status: ProcessStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        runtime_ms: u64,
    },

    // -- logs --
    #[serde(rename = "log:line")]
    LogLine {
        process_id: ProcessId,
        process_name: String,
        text: String,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(rename = "error:detected")]
    ErrorDetected { context: ErrorContext },

    #[serde(rename = "build:event")]
    BuildEvent { process_id: ProcessId, line: String },

    // -- tests --
    #[serde(rename = "test:started")]
    TestStarted {
        process_id: ProcessId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_name: Option<String>,
    },

    #[serde(rename = "test:passed")]
    TestPassed {
        process_id: ProcessId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_name: Option<String>,
    },

    #[serde(rename = "test:failed")]
    TestFailed {
        process_id: ProcessId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    // -- urls / proxy --
    #[serde(rename = "url:detected")]
    UrlDetected {
        process_id: ProcessId,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },

    #[serde(rename = "proxy:request")]
    ProxyRequest { request: Box<ProxyRequest> },

    // -- mcp --
    #[serde(rename = "mcp:connected")]
    McpConnected { session_id: String },

    #[serde(rename = "mcp:activity")]
    McpActivity { session_id: String, method: String },

    #[serde(rename = "mcp:disconnected")]
    McpDisconnected { session_id: String },

    // -- system --
    #[serde(rename = "system:message")]
    SystemMessage { level: String, message: String },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProcessStarted { .. } => EventKind::ProcessStarted,
            Event::ProcessExited { .. } => EventKind::ProcessExited,
            Event::LogLine { .. } => EventKind::LogLine,
            Event::ErrorDetected { .. } => EventKind::ErrorDetected,
            Event::BuildEvent { .. } => EventKind::BuildEvent,
            Event::TestStarted { .. } => EventKind::TestStarted,
            Event::TestPassed { .. } => EventKind::TestPassed,
            Event::TestFailed { .. } => EventKind::TestFailed,
            Event::UrlDetected { .. } => EventKind::UrlDetected,
            Event::ProxyRequest { .. } => EventKind::ProxyRequest,
            Event::McpConnected { .. } => EventKind::McpConnected,
            Event::McpActivity { .. } => EventKind::McpActivity,
            Event::McpDisconnected { .. } => EventKind::McpDisconnected,
            Event::SystemMessage { .. } => EventKind::SystemMessage,
            Event::Custom => EventKind::Custom,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::ProcessStarted { .. } => "process:started",
            Event::ProcessExited { .. } => "process:exited",
            Event::LogLine { .. } => "log:line",
            Event::ErrorDetected { .. } => "error:detected",
            Event::BuildEvent { .. } => "build:event",
            Event::TestStarted { .. } => "test:started",
            Event::TestPassed { .. } => "test:passed",
            Event::TestFailed { .. } => "test:failed",
            Event::UrlDetected { .. } => "url:detected",
            Event::ProxyRequest { .. } => "proxy:request",
            Event::McpConnected { .. } => "mcp:connected",
            Event::McpActivity { .. } => "mcp:activity",
            Event::McpDisconnected { .. } => "mcp:disconnected",
            Event::SystemMessage { .. } => "system:message",
            Event::Custom => "custom",
        }
    }

    /// One-line summary for operator logs.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::ProcessStarted { id, .. } => format!("{t} process={id}"),
            Event::ProcessExited { id, status, exit_code, .. } => {
                format!("{t} process={id} status={status} code={exit_code:?}")
            }
            Event::LogLine { process_id, is_error, .. } => {
                format!("{t} process={process_id} error={is_error}")
            }
            Event::ErrorDetected { context } => {
                format!("{t} process={} msg={}", context.process_id, context.root_message)
            }
            Event::BuildEvent { process_id, .. } => format!("{t} process={process_id}"),
            Event::TestStarted { process_id, .. }
            | Event::TestPassed { process_id, .. }
            | Event::TestFailed { process_id, .. } => format!("{t} process={process_id}"),
            Event::UrlDetected { process_id, url, .. } => {
                format!("{t} process={process_id} url={url}")
            }
            Event::ProxyRequest { request } => {
                format!("{t} {} {} status={}", request.method, request.url, request.status)
            }
            Event::McpConnected { session_id }
            | Event::McpDisconnected { session_id } => format!("{t} session={session_id}"),
            Event::McpActivity { session_id, method } => {
                format!("{t} session={session_id} method={method}")
            }
            Event::SystemMessage { level, message } => format!("{t} [{level}] {message}"),
            Event::Custom => t.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
