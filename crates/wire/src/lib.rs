// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-protocol wire types
//!
//! JSON-RPC 2.0 envelopes plus the tool/resource/prompt payloads exchanged
//! over the streaming HTTP and stdio transports. Pure types; transports
//! live in `brum-mcp`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod jsonrpc;
mod methods;
mod types;

pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use methods::{
    HUB_TOOL_CONNECT, HUB_TOOL_DISCONNECT, HUB_TOOL_LIST, METHOD_INITIALIZE, METHOD_PING,
    METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_RESOURCES_SUBSCRIBE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    NOTIFICATION_RESOURCE_UPDATED, PROTOCOL_VERSION, SESSION_HEADER,
};
pub use types::{
    CallToolParams, CallToolResult, Capabilities, ContentPart, GetPromptParams, GetPromptResult,
    InitializeResult, PromptArgument, PromptDef, PromptMessage, PromptsListResult,
    ReadResourceParams, ReadResourceResult, ResourceContents, ResourceDef, ResourcesListResult,
    ServerInfo, SubscribeParams, ToolDef, ToolsListResult,
};
