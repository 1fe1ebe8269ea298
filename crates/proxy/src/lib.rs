// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-intercepting proxy
//!
//! Two modes chosen at construction. Reverse (the default) allocates one
//! loopback port per registered target origin and serves that target;
//! forward runs a single port accepting absolute-URI requests and CONNECT
//! tunnels. Both observe traffic into a bounded capture ring and inject a
//! telemetry script into top-level HTML navigations.
//!
//! Mapping state is owned by a single control task fed through a channel;
//! bus handlers never touch the tables directly.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod capture;
mod forward;
mod inject;
mod server;

pub use capture::RequestLedger;
pub use inject::{classify, should_inject, RequestFacts, TELEMETRY_PATH};
pub use server::{ProxyHandle, ProxyMode, ProxyServer};

/// Errors from proxy startup and registration.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("no free port in range {base}..{end}")]
    NoFreePort { base: u16, end: u16 },

    #[error("listen failed on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid target url: {0}")]
    InvalidTarget(String),
}
