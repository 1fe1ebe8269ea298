// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client to a peer's tool server
//!
//! Each call is a JSON-RPC request over `POST /mcp`. Streaming calls open
//! an SSE response and relay `message` events. One shared reqwest client
//! keeps connections alive; every call carries the peer session id captured
//! at `initialize`.

use async_trait::async_trait;
use brum_core::ErrorKind;
use brum_wire::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeResult,
    JsonRpcRequest, JsonRpcResponse, PromptsListResult, ReadResourceParams, ReadResourceResult,
    RequestId, ResourcesListResult, SubscribeParams, ToolsListResult, METHOD_INITIALIZE,
    METHOD_PING, METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST,
    METHOD_RESOURCES_READ, METHOD_RESOURCES_SUBSCRIBE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    SESSION_HEADER,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors from peer calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("peer returned {status}")]
    Status { status: u16 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("peer error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("call timed out")]
    Timeout,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Transport(_) | Self::Status { .. } => ErrorKind::PeerUnavailable,
            Self::Protocol(_) => ErrorKind::ProtocolError,
            Self::Rpc { .. } => ErrorKind::Internal,
            Self::Timeout => ErrorKind::Timeout,
        }
    }
}

/// Peer operations the hub needs; implemented by [`HubClient`] and by test
/// doubles.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn ping(&self) -> Result<(), ClientError>;
    async fn list_tools(&self) -> Result<ToolsListResult, ClientError>;
    async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, ClientError>;

    /// Streaming variant relaying intermediate events; the default falls
    /// back to the plain call.
    async fn call_tool_streaming(
        &self,
        name: &str,
        args: Value,
        _events: mpsc::Sender<JsonRpcResponse>,
    ) -> Result<CallToolResult, ClientError> {
        self.call_tool(name, args).await
    }
    async fn list_resources(&self) -> Result<ResourcesListResult, ClientError>;
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError>;
    async fn subscribe_resource(&self, uri: &str) -> Result<(), ClientError>;
    async fn list_prompts(&self) -> Result<PromptsListResult, ClientError>;
    async fn get_prompt(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<GetPromptResult, ClientError>;
    async fn close(&self);
}

/// Concrete client over `POST /mcp`.
pub struct HubClient {
    http: reqwest::Client,
    endpoint: String,
    session: Mutex<Option<String>>,
    next_id: AtomicI64,
    server_info: Mutex<Option<InitializeResult>>,
}

impl HubClient {
    /// Connect to `http://127.0.0.1:<port>/mcp` and run the `initialize`
    /// handshake.
    pub async fn connect(endpoint: String, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        let client = Self {
            http,
            endpoint,
            session: Mutex::new(None),
            next_id: AtomicI64::new(1),
            server_info: Mutex::new(None),
        };
        let init: InitializeResult =
            parse_result(client.roundtrip(METHOD_INITIALIZE, None).await?)?;
        *client.server_info.lock() = Some(init);
        Ok(client)
    }

    pub fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().clone()
    }

    fn next_request(&self, method: &str, params: Option<Value>) -> JsonRpcRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        JsonRpcRequest::new(RequestId::Number(id), method, params)
    }

    /// One JSON request/response exchange.
    async fn roundtrip(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let request = self.next_request(method, params);
        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request);
        if let Some(session) = self.session.lock().clone() {
            builder = builder.header(SESSION_HEADER, session);
        }

        let resp = builder.send().await.map_err(wrap_reqwest)?;
        if let Some(session) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session.lock() = Some(session.to_string());
        }
        if !resp.status().is_success() {
            return Err(ClientError::Status { status: resp.status().as_u16() });
        }
        let body: JsonRpcResponse = resp.json().await.map_err(wrap_reqwest)?;
        if let Some(error) = body.error {
            return Err(ClientError::Rpc { code: error.code, message: error.message });
        }
        body.result
            .ok_or_else(|| ClientError::Protocol("response missing result".to_string()))
    }

    /// Streaming tool call: relay intermediate SSE messages, resolve with
    /// the final response for our request id.
    pub async fn call_tool_streaming(
        &self,
        name: &str,
        args: Value,
        events: mpsc::Sender<JsonRpcResponse>,
    ) -> Result<CallToolResult, ClientError> {
        let params = serde_json::json!(CallToolParams { name: name.to_string(), arguments: args });
        let request = self.next_request(METHOD_TOOLS_CALL, Some(params));
        let want_id = request.id.clone();

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request);
        if let Some(session) = self.session.lock().clone() {
            builder = builder.header(SESSION_HEADER, session);
        }
        let resp = builder.send().await.map_err(wrap_reqwest)?;
        if !resp.status().is_success() {
            return Err(ClientError::Status { status: resp.status().as_u16() });
        }

        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(wrap_reqwest)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let block: String = buffer.drain(..pos + 2).collect();
                let Some(data) = sse_data(&block) else { continue };
                let Ok(message) = serde_json::from_str::<JsonRpcResponse>(&data) else {
                    debug!("ignoring non-response SSE frame");
                    continue;
                };
                if message.id == want_id {
                    if let Some(error) = message.error {
                        return Err(ClientError::Rpc { code: error.code, message: error.message });
                    }
                    let result = message
                        .result
                        .ok_or_else(|| ClientError::Protocol("missing result".to_string()))?;
                    return serde_json::from_value(result)
                        .map_err(|e| ClientError::Protocol(e.to_string()));
                }
                // Intermediate event for this call: relay.
                let _ = events.send(message).await;
            }
        }
        Err(ClientError::Protocol("stream ended without a response".to_string()))
    }
}

/// Extract the `data:` payload from one SSE event block.
fn sse_data(block: &str) -> Option<String> {
    let mut data = String::new();
    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    (!data.is_empty()).then_some(data)
}

fn wrap_reqwest(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(e)
    }
}

fn parse_result<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Protocol(e.to_string()))
}

#[async_trait]
impl PeerClient for HubClient {
    async fn ping(&self) -> Result<(), ClientError> {
        self.roundtrip(METHOD_PING, None).await.map(|_| ())
    }

    async fn list_tools(&self) -> Result<ToolsListResult, ClientError> {
        parse_result(self.roundtrip(METHOD_TOOLS_LIST, None).await?)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, ClientError> {
        let params = serde_json::json!(CallToolParams { name: name.to_string(), arguments: args });
        parse_result(self.roundtrip(METHOD_TOOLS_CALL, Some(params)).await?)
    }

    async fn call_tool_streaming(
        &self,
        name: &str,
        args: Value,
        events: mpsc::Sender<JsonRpcResponse>,
    ) -> Result<CallToolResult, ClientError> {
        HubClient::call_tool_streaming(self, name, args, events).await
    }

    async fn list_resources(&self) -> Result<ResourcesListResult, ClientError> {
        parse_result(self.roundtrip(METHOD_RESOURCES_LIST, None).await?)
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        let params = serde_json::json!(ReadResourceParams { uri: uri.to_string() });
        parse_result(self.roundtrip(METHOD_RESOURCES_READ, Some(params)).await?)
    }

    async fn subscribe_resource(&self, uri: &str) -> Result<(), ClientError> {
        let params = serde_json::json!(SubscribeParams { uri: uri.to_string() });
        self.roundtrip(METHOD_RESOURCES_SUBSCRIBE, Some(params)).await.map(|_| ())
    }

    async fn list_prompts(&self) -> Result<PromptsListResult, ClientError> {
        parse_result(self.roundtrip(METHOD_PROMPTS_LIST, None).await?)
    }

    async fn get_prompt(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<GetPromptResult, ClientError> {
        let params = serde_json::json!(GetPromptParams { name: name.to_string(), arguments: args });
        parse_result(self.roundtrip(METHOD_PROMPTS_GET, Some(params)).await?)
    }

    /// Best-effort session termination.
    async fn close(&self) {
        let session = self.session.lock().clone();
        if let Some(session) = session {
            let result = self
                .http
                .delete(&self.endpoint)
                .header(SESSION_HEADER, session)
                .send()
                .await;
            if let Err(e) = result {
                warn!(error = %e, "session close failed");
            }
        }
    }
}
