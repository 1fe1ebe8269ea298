// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy mappings and captured exchanges

use crate::process::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of a proxied request, from Accept header, method, and URL
/// heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Page,
    Api,
    Image,
    Other,
    /// Upstream failure; the browser saw a 502-class response.
    Error,
}

/// A reverse mapping exposing an internal origin on a loopback port.
///
/// Lifetime is bound to the originating process; removed when it terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMapping {
    pub target_url: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub process_id: ProcessId,
}

/// One captured HTTP exchange, stored in a bounded ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub id: u64,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub request_size: u64,
    pub response_size: u64,
    /// Selected request/response headers worth keeping (content-type, accept,
    /// sec-fetch-mode and friends).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_excerpt: Option<String>,
    pub kind: RequestKind,
    pub started_at: DateTime<Utc>,
    /// Telemetry session correlated by origin, when the injected script
    /// has reported in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_session: Option<String>,
}
