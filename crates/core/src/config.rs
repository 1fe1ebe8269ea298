// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration, assembled once at startup and passed by value.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one supervisor instance.
///
/// There is no global state; components receive this (or the slice of it
/// they need) at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project working directory.
    pub dir: PathBuf,
    /// Tool-server port (0 disables).
    pub mcp_port: u16,
    /// Whether the tool server runs at all.
    pub mcp_enabled: bool,
    /// Reverse-mode port base / forward-mode listening port.
    pub proxy_port: u16,
    pub proxy_enabled: bool,
    /// Forward mode serves a single shared port; reverse allocates per URL.
    pub proxy_forward_mode: bool,
    /// Debug event surfaces enabled.
    pub debug: bool,

    // -- event bus --
    /// Worker pool size; 0 means `ceil(cpus * 2.5)`.
    pub bus_workers: usize,

    // -- log store --
    pub log_ring_capacity: usize,
    pub log_intake_capacity: usize,
    /// Max gap between lines of one error cluster.
    pub error_cluster_gap: Duration,
    /// Path fragments treated as vendor/runtime when picking the preferred
    /// code reference.
    pub vendor_paths: Vec<String>,

    // -- supervisor --
    /// Grace period between SIGINT and SIGKILL on stop.
    pub stop_grace: Duration,
    /// Maximum bytes per forwarded log line; longer lines are split.
    pub max_line_bytes: usize,

    // -- proxy --
    pub proxy_ring_capacity: usize,
    pub upstream_timeout: Duration,

    // -- discovery / hub --
    pub discovery_stale_after: Duration,
    pub discovery_sweep_interval: Duration,
    pub discovery_heartbeat: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// Consecutive ping timeouts before a peer leaves `active`.
    pub ping_failure_budget: u32,
    /// Max reconnect attempts before a peer is marked dead.
    pub max_retries: u32,

    // -- tool server --
    pub session_idle_timeout: Duration,
    pub call_timeout: Duration,
    pub shutdown_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            mcp_port: 7777,
            mcp_enabled: true,
            proxy_port: 19888,
            proxy_enabled: true,
            proxy_forward_mode: false,
            debug: false,
            bus_workers: 0,
            log_ring_capacity: 10_000,
            log_intake_capacity: 1_000,
            error_cluster_gap: Duration::from_millis(500),
            vendor_paths: default_vendor_paths(),
            stop_grace: Duration::from_secs(5),
            max_line_bytes: 2048,
            proxy_ring_capacity: 1_000,
            upstream_timeout: Duration::from_secs(30),
            discovery_stale_after: Duration::from_secs(300),
            discovery_sweep_interval: Duration::from_secs(30),
            discovery_heartbeat: Duration::from_secs(60),
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
            ping_failure_budget: 3,
            max_retries: 5,
            session_idle_timeout: Duration::from_secs(30 * 60),
            call_timeout: Duration::from_secs(30),
            shutdown_deadline: Duration::from_secs(10),
        }
    }
}

fn default_vendor_paths() -> Vec<String> {
    [
        "node_modules/",
        "vendor/",
        "site-packages/",
        ".cargo/registry",
        "/usr/lib",
        "internal/",
        "<anonymous>",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
