// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol dispatch shared by the HTTP instance server and the stdio hub

use crate::registry::{
    validate_args, McpError, PromptRegistry, ResourceRegistry, ToolRegistry,
};
use crate::session::{SessionCtx, SessionManager};
use brum_bus::EventBus;
use brum_core::{ErrorKind, Event};
use brum_wire::{
    CallToolParams, Capabilities, GetPromptParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ReadResourceParams, ServerInfo, SubscribeParams, METHOD_INITIALIZE,
    METHOD_PING, METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST,
    METHOD_RESOURCES_READ, METHOD_RESOURCES_SUBSCRIBE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registries, sessions, and identity for one tool server.
pub struct ServerCore {
    pub tools: ToolRegistry,
    pub resources: ResourceRegistry,
    pub prompts: PromptRegistry,
    pub sessions: SessionManager,
    pub info: ServerInfo,
    pub bus: EventBus,
}

impl ServerCore {
    pub fn new(info: ServerInfo, sessions: SessionManager, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            tools: ToolRegistry::new(),
            resources: ResourceRegistry::new(),
            prompts: PromptRegistry::new(),
            sessions,
            info,
            bus,
        })
    }

    /// Handle one request. Returns `None` for notifications.
    pub async fn handle(&self, session_id: &str, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if !req.is_valid() {
            return Some(JsonRpcResponse::error(
                req.id,
                ErrorKind::ProtocolError,
                "malformed JSON-RPC envelope",
            ));
        }
        let id = req.id.clone();
        if req.is_notification() {
            debug!(method = %req.method, "notification ignored");
            return None;
        }
        self.bus.publish(Event::McpActivity {
            session_id: session_id.to_string(),
            method: req.method.clone(),
        });
        self.sessions.touch(session_id);

        let result = match req.method.as_str() {
            METHOD_INITIALIZE => Ok(json!(self.initialize_result())),
            METHOD_PING => Ok(json!({})),
            METHOD_TOOLS_LIST => Ok(json!({ "tools": self.tools.list() })),
            METHOD_TOOLS_CALL => self.call_tool(session_id, req.params).await.map(|r| json!(r)),
            METHOD_RESOURCES_LIST => Ok(json!({ "resources": self.resources.list() })),
            METHOD_RESOURCES_READ => self.read_resource(req.params).await,
            METHOD_RESOURCES_SUBSCRIBE => self.subscribe_resource(session_id, req.params),
            METHOD_PROMPTS_LIST => Ok(json!({ "prompts": self.prompts.list() })),
            METHOD_PROMPTS_GET => self.get_prompt(req.params),
            other => Err(McpError::not_found(format!("unknown method: {other}"))),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::ok(id, value),
            Err(e) => JsonRpcResponse::error(id, e.kind, e.message),
        })
    }

    pub fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: self.info.clone(),
            capabilities: Capabilities {
                tools: Some(json!({})),
                resources: Some(json!({ "subscribe": true })),
                prompts: Some(json!({})),
            },
        }
    }

    /// Run a tool with schema validation and panic containment.
    pub async fn call_tool(
        &self,
        session_id: &str,
        params: Option<Value>,
    ) -> Result<brum_wire::CallToolResult, McpError> {
        let params: CallToolParams = parse_params(params)?;
        let Some((def, handler)) = self.tools.get(&params.name) else {
            return Err(McpError::not_found(format!("unknown tool: {}", params.name)));
        };
        validate_args(&def.input_schema, &params.arguments)
            .map_err(McpError::invalid_argument)?;

        let ctx = SessionCtx { session_id: session_id.to_string() };
        let future = handler(params.arguments, ctx);
        // Spawned so a panicking handler surfaces as a JoinError instead of
        // unwinding through the transport.
        match tokio::spawn(future).await {
            Ok(result) => result,
            Err(join) if join.is_panic() => {
                warn!(tool = %params.name, "tool handler panicked");
                Err(McpError::internal(format!("tool {} failed internally", params.name)))
            }
            Err(_) => Err(McpError::new(ErrorKind::Canceled, "tool call canceled")),
        }
    }

    async fn read_resource(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: ReadResourceParams = parse_params(params)?;
        let Some(reader) = self.resources.reader(&params.uri) else {
            return Err(McpError::not_found(format!("unknown resource: {}", params.uri)));
        };
        reader().await.map(|r| json!(r))
    }

    fn subscribe_resource(
        &self,
        session_id: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let params: SubscribeParams = parse_params(params)?;
        if !self.resources.contains(&params.uri) {
            return Err(McpError::not_found(format!("unknown resource: {}", params.uri)));
        }
        if !self.sessions.subscribe(session_id, &params.uri) {
            return Err(McpError::not_found(format!("unknown session: {session_id}")));
        }
        Ok(json!({}))
    }

    fn get_prompt(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: GetPromptParams = parse_params(params)?;
        let Some((_, builder)) = self.prompts.get(&params.name) else {
            return Err(McpError::not_found(format!("unknown prompt: {}", params.name)));
        };
        builder(params.arguments).map(|r| json!(r))
    }
}

pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>,
) -> Result<T, McpError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| McpError::invalid_argument(format!("invalid params: {e}")))
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
