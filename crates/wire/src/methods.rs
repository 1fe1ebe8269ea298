// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol method names, headers, and hub tool names

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Session correlation header for the streaming HTTP transport.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";
pub const METHOD_RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
pub const METHOD_PROMPTS_GET: &str = "prompts/get";

pub const NOTIFICATION_RESOURCE_UPDATED: &str = "notifications/resources/updated";

/// Hub-local tools, always present in hub `tools/list` results.
pub const HUB_TOOL_LIST: &str = "instances/list";
pub const HUB_TOOL_CONNECT: &str = "instances/connect";
pub const HUB_TOOL_DISCONNECT: &str = "instances/disconnect";
