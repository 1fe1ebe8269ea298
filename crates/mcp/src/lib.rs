// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool server, hub, and peer plumbing
//!
//! The instance side runs a streaming HTTP transport exposing tools,
//! resources, and prompts; the hub side runs over stdio and proxies tool
//! calls to peer instances discovered on the filesystem. Peer connection
//! state lives in a single owner task (no shared mutexes).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod conn;
mod dispatch;
mod health;
mod hub;
mod instance;
mod registry;
mod server;
mod session;

#[cfg(test)]
mod test_support;

pub use client::{ClientError, HubClient, PeerClient};
pub use conn::{ConnectionManager, Connector, PeerSnapshot, PeerState};
pub use dispatch::ServerCore;
pub use health::HealthMonitor;
pub use hub::HubServer;
pub use instance::{build_instance_core, read_scripts};
pub use registry::{
    validate_args, McpError, PromptBuilder, PromptRegistry, ResourceReader, ResourceRegistry,
    ToolHandler, ToolRegistry,
};
pub use server::{McpHttpServer, ServeError};
pub use session::{SessionCtx, SessionManager};
