// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub server over stdio
//!
//! A tool server with a fixed set of hub tools (`instances/list`,
//! `instances/connect`, `instances/disconnect`) plus a proxy layer: once a
//! session is connected to a peer, the peer's tools are merged into
//! `tools/list` (hub tools win name collisions) and `tools/call` for peer
//! names routes through the peer's client. Streamed peer events are relayed
//! as notifications on stdout.

use crate::conn::ConnectionManager;
use crate::dispatch::{parse_params, ServerCore};
use crate::registry::McpError;
use crate::session::SessionManager;
use brum_bus::EventBus;
use brum_core::ErrorKind;
use brum_wire::{
    CallToolParams, CallToolResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ServerInfo,
    ToolDef, HUB_TOOL_CONNECT, HUB_TOOL_DISCONNECT, HUB_TOOL_LIST, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct HubServer {
    core: Arc<ServerCore>,
    conn: ConnectionManager,
    /// The stdio transport carries exactly one session.
    session_id: String,
}

impl HubServer {
    pub fn new(conn: ConnectionManager, bus: EventBus, version: &str) -> Arc<Self> {
        let sessions = SessionManager::new(Duration::from_secs(30 * 60));
        let core = ServerCore::new(
            ServerInfo { name: "brummer-hub".to_string(), version: version.to_string() },
            sessions,
            bus,
        );
        let session_id = format!("stdio-{}", Uuid::new_v4().simple());
        core.sessions.resolve(Some(&session_id));

        let hub = Arc::new(Self { core, conn, session_id });
        hub.register_hub_tools();
        hub
    }

    /// The fixed hub tools, registered like any other tool so they appear
    /// in `tools/list` and win merges by name.
    fn register_hub_tools(&self) {
        let conn = self.conn.clone();
        let result = self.core.tools.register(
            ToolDef {
                name: HUB_TOOL_LIST.to_string(),
                description: Some("List discovered instances and their connection state".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Arc::new(move |_args, _ctx| {
                let conn = conn.clone();
                Box::pin(async move {
                    let peers = conn.list().await;
                    Ok(CallToolResult::json(&json!(peers)))
                })
            }),
        );
        log_registration(HUB_TOOL_LIST, result);

        let conn = self.conn.clone();
        let result = self.core.tools.register(
            ToolDef {
                name: HUB_TOOL_CONNECT.to_string(),
                description: Some("Bind this session to an instance".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {"instance_id": {"type": "string"}},
                    "required": ["instance_id"]
                }),
            },
            Arc::new(move |args, ctx| {
                let conn = conn.clone();
                Box::pin(async move {
                    let instance_id = args["instance_id"].as_str().unwrap_or_default().to_string();
                    conn.connect_session(&ctx.session_id, &instance_id).await?;
                    Ok(CallToolResult::json(
                        &json!({"connected": true, "instance_id": instance_id}),
                    ))
                })
            }),
        );
        log_registration(HUB_TOOL_CONNECT, result);

        let conn = self.conn.clone();
        let result = self.core.tools.register(
            ToolDef {
                name: HUB_TOOL_DISCONNECT.to_string(),
                description: Some("Unbind this session from its instance".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Arc::new(move |_args, ctx| {
                let conn = conn.clone();
                Box::pin(async move {
                    conn.disconnect_session(&ctx.session_id).await;
                    Ok(CallToolResult::json(&json!({"connected": false})))
                })
            }),
        );
        log_registration(HUB_TOOL_DISCONNECT, result);
    }

    /// Handle one request for `session_id`, with the hub's proxy overrides.
    pub async fn handle(
        &self,
        session_id: &str,
        req: JsonRpcRequest,
        events: &mpsc::Sender<JsonRpcRequest>,
    ) -> Option<JsonRpcResponse> {
        let method = req.method.clone();
        match method.as_str() {
            METHOD_TOOLS_LIST => Some(self.merged_tools(session_id, req.id).await),
            METHOD_TOOLS_CALL => Some(self.routed_call(session_id, req, events).await),
            _ => self.core.handle(session_id, req).await,
        }
    }

    /// Hub tools plus the bound peer's tools; hub names take precedence.
    async fn merged_tools(
        &self,
        session_id: &str,
        id: Option<brum_wire::RequestId>,
    ) -> JsonRpcResponse {
        let mut tools = self.core.tools.list();
        if let Some((peer_id, client)) = self.conn.client_for_session(session_id).await {
            match client.list_tools().await {
                Ok(peer_tools) => {
                    for tool in peer_tools.tools {
                        if !tools.iter().any(|t| t.name == tool.name) {
                            tools.push(tool);
                        }
                    }
                    self.conn.record_activity(&peer_id).await;
                }
                Err(e) => warn!(peer = %peer_id, error = %e, "peer tools/list failed"),
            }
        }
        JsonRpcResponse::ok(id, json!({ "tools": tools }))
    }

    /// Hub tools run locally; anything else routes to the bound peer.
    async fn routed_call(
        &self,
        session_id: &str,
        req: JsonRpcRequest,
        events: &mpsc::Sender<JsonRpcRequest>,
    ) -> JsonRpcResponse {
        let id = req.id.clone();
        let params: CallToolParams = match parse_params(req.params.clone()) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::error(id, e.kind, e.message),
        };

        if self.core.tools.contains(&params.name) {
            return match self.core.call_tool(session_id, req.params).await {
                Ok(result) => JsonRpcResponse::ok(id, json!(result)),
                Err(e) => JsonRpcResponse::error(id, e.kind, e.message),
            };
        }

        let Some((peer_id, client)) = self.conn.client_for_session(session_id).await else {
            return JsonRpcResponse::error(
                id,
                ErrorKind::NotConnected,
                format!("session not connected to an instance (tool {})", params.name),
            );
        };

        // Relay streamed peer events to this session's transport.
        let (peer_events_tx, mut peer_events_rx) = mpsc::channel::<JsonRpcResponse>(16);
        let relay_out = events.clone();
        let relay = tokio::spawn(async move {
            while let Some(event) = peer_events_rx.recv().await {
                let note = JsonRpcRequest::notification(
                    "notifications/message",
                    event.result.or_else(|| event.error.map(|e| json!(e))),
                );
                if relay_out.send(note).await.is_err() {
                    return;
                }
            }
        });

        let outcome = client
            .call_tool_streaming(&params.name, params.arguments, peer_events_tx)
            .await;
        let _ = relay.await;

        match outcome {
            Ok(result) => {
                self.conn.record_activity(&peer_id).await;
                JsonRpcResponse::ok(id, json!(result))
            }
            Err(e) => {
                debug!(peer = %peer_id, tool = %params.name, error = %e, "peer call failed");
                JsonRpcResponse::error(id, e.kind(), e.to_string())
            }
        }
    }

    /// Run the line-delimited JSON-RPC loop over stdio until EOF or cancel.
    pub async fn run_stdio(self: Arc<Self>, cancel: CancellationToken) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        // One writer task serializes stdout: responses and relayed events.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = out_rx.recv().await {
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
                if stdout.write_all(b"\n").await.is_err() {
                    return;
                }
                let _ = stdout.flush().await;
            }
        });

        // Notifications (relayed streaming events) ride the same writer.
        let (note_tx, mut note_rx) = mpsc::channel::<JsonRpcRequest>(64);
        let note_out = out_tx.clone();
        tokio::spawn(async move {
            while let Some(note) = note_rx.recv().await {
                if let Ok(line) = serde_json::to_string(&note) {
                    if note_out.send(line).await.is_err() {
                        return;
                    }
                }
            }
        });

        info!(session = %self.session_id, "hub serving on stdio");
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: JsonRpcMessage = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    let resp = JsonRpcResponse::error(
                        None,
                        ErrorKind::ProtocolError,
                        format!("unparseable payload: {e}"),
                    );
                    send_json(&out_tx, &resp).await;
                    continue;
                }
            };
            for request in message.requests() {
                if let Some(resp) = self.handle(&self.session_id, request, &note_tx).await {
                    send_json(&out_tx, &resp).await;
                }
            }
        }

        // Release both stdout senders so the writer can drain and exit.
        drop(note_tx);
        drop(out_tx);
        let _ = writer.await;
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn core(&self) -> &ServerCore {
        &self.core
    }
}

async fn send_json(out: &mpsc::Sender<String>, resp: &JsonRpcResponse) {
    if let Ok(line) = serde_json::to_string(resp) {
        let _ = out.send(line).await;
    }
}

fn log_registration(name: &str, result: Result<(), McpError>) {
    if let Err(e) = result {
        warn!(tool = name, error = %e, "hub tool registration failed");
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
