// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standard instance tool set
//!
//! Builds a [`ServerCore`] wired to the supervisor, log store, and proxy:
//! script tools, log queries, capture queries, the `logs://recent`
//! subscribable resource, and a debugging prompt. Everything here goes
//! through the same registry a dynamically-registered tool would use.

use crate::dispatch::ServerCore;
use crate::registry::McpError;
use crate::session::SessionManager;
use brum_bus::EventBus;
use brum_core::{ErrorKind, EventKind, ProcessId};
use brum_logs::LogStore;
use brum_proxy::ProxyHandle;
use brum_supervisor::Supervisor;
use brum_wire::{
    CallToolResult, ContentPart, GetPromptResult, PromptArgument, PromptDef, PromptMessage,
    ReadResourceResult, ResourceContents, ResourceDef, ServerInfo, ToolDef,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LOGS_RECENT_URI: &str = "logs://recent";
const PROXY_REQUESTS_URI: &str = "proxy://requests";

/// Read the `scripts` map from a project's `package.json`.
pub fn read_scripts(dir: &Path) -> Result<BTreeMap<String, String>, McpError> {
    let manifest = dir.join("package.json");
    let body = std::fs::read(&manifest).map_err(|e| {
        McpError::not_found(format!("no readable package.json in {}: {e}", dir.display()))
    })?;
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| McpError::new(ErrorKind::ProtocolError, format!("invalid package.json: {e}")))?;
    let mut scripts = BTreeMap::new();
    if let Some(map) = value.get("scripts").and_then(Value::as_object) {
        for (name, command) in map {
            if let Some(command) = command.as_str() {
                scripts.insert(name.clone(), command.to_string());
            }
        }
    }
    Ok(scripts)
}

/// Build the instance server core with the standard tool set registered.
#[allow(clippy::too_many_arguments)]
pub fn build_instance_core(
    project_name: &str,
    version: &str,
    dir: PathBuf,
    bus: EventBus,
    supervisor: Supervisor,
    logs: Arc<LogStore>,
    proxy: Option<ProxyHandle>,
    session_idle: Duration,
    cancel: &CancellationToken,
) -> Arc<ServerCore> {
    let sessions = SessionManager::new(session_idle);
    sessions.start_sweeper(cancel);
    let core = ServerCore::new(
        ServerInfo { name: format!("brummer/{project_name}"), version: version.to_string() },
        sessions,
        bus.clone(),
    );

    register_script_tools(&core, &dir, &supervisor);
    register_log_tools(&core, &logs);
    if let Some(proxy) = &proxy {
        register_proxy_tools(&core, proxy);
    }
    register_resources(&core, &logs, proxy.as_ref());
    register_prompts(&core, &logs);

    // logs://recent subscribers learn about fresh lines through the bus.
    {
        let sessions = core.sessions.clone();
        bus.subscribe(
            EventKind::LogLine,
            Arc::new(move |_| sessions.notify_resource_updated(LOGS_RECENT_URI)),
        );
    }

    core
}

fn register_script_tools(core: &Arc<ServerCore>, dir: &Path, supervisor: &Supervisor) {
    let schema_empty = json!({"type": "object", "properties": {}});
    let schema_name = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    });
    let schema_process = json!({
        "type": "object",
        "properties": {"processId": {"type": "string"}},
        "required": ["processId"]
    });

    let tool_dir = dir.to_path_buf();
    register(core, "scripts/list", "List package scripts", schema_empty.clone(), move |_args| {
        let scripts = read_scripts(&tool_dir)?;
        let list: Vec<Value> = scripts
            .iter()
            .map(|(name, command)| json!({"name": name, "command": command}))
            .collect();
        Ok(CallToolResult::json(&json!(list)))
    });

    let tool_dir = dir.to_path_buf();
    let sup = supervisor.clone();
    register(core, "scripts/run", "Start a package script", schema_name, move |args| {
        let name = args["name"].as_str().unwrap_or_default();
        let scripts = read_scripts(&tool_dir)?;
        let Some(command) = scripts.get(name) else {
            return Err(McpError::not_found(format!("unknown script: {name}")));
        };
        let outcome = sup
            .start(name, command, tool_dir.clone())
            .map_err(|e| McpError::new(e.kind(), e.to_string()))?;
        if outcome.duplicate {
            Ok(CallToolResult::json(
                &json!({"duplicate": true, "processId": outcome.record.id}),
            ))
        } else {
            Ok(CallToolResult::json(&json!({
                "processId": outcome.record.id,
                "status": outcome.record.status,
            })))
        }
    });

    let sup = supervisor.clone();
    register_async(core, "scripts/stop", "Stop a running process", schema_process.clone(), move |args| {
        let sup = sup.clone();
        async move {
            let id = ProcessId::from_string(args["processId"].as_str().unwrap_or_default());
            let record =
                sup.stop(&id).await.map_err(|e| McpError::new(e.kind(), e.to_string()))?;
            Ok(CallToolResult::json(&json!({
                "processId": record.id,
                "status": record.status,
                "exitCode": record.exit_code,
            })))
        }
    });

    let sup = supervisor.clone();
    register_async(
        core,
        "scripts/restart",
        "Restart a process after its exit is observed",
        schema_process,
        move |args| {
            let sup = sup.clone();
            async move {
                let id = ProcessId::from_string(args["processId"].as_str().unwrap_or_default());
                let outcome =
                    sup.restart(&id).await.map_err(|e| McpError::new(e.kind(), e.to_string()))?;
                Ok(CallToolResult::json(&json!({
                    "processId": outcome.record.id,
                    "status": outcome.record.status,
                })))
            }
        },
    );

    let sup = supervisor.clone();
    register(core, "scripts/status", "List supervised processes", schema_empty, move |_args| {
        let records = sup.list();
        Ok(CallToolResult::json(&json!(records)))
    });
}

fn register_log_tools(core: &Arc<ServerCore>, logs: &Arc<LogStore>) {
    let schema_search = json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"},
            "processId": {"type": "string"}
        },
        "required": ["query"]
    });
    let schema_limit = json!({
        "type": "object",
        "properties": {"limit": {"type": "integer"}}
    });

    let store = Arc::clone(logs);
    register(core, "logs/search", "Regex search over captured logs", schema_search, move |args| {
        let query = args["query"].as_str().unwrap_or_default();
        let process = args["processId"].as_str().map(ProcessId::from_string);
        let entries = store
            .search(query, None, process.as_ref())
            .map_err(|e| McpError::invalid_argument(e.to_string()))?;
        Ok(CallToolResult::json(&json!(entries)))
    });

    let store = Arc::clone(logs);
    register(core, "logs/recent", "Most recent log entries", schema_limit.clone(), move |args| {
        let limit = args["limit"].as_u64().unwrap_or(100) as usize;
        let all = store.get_all();
        let start = all.len().saturating_sub(limit);
        Ok(CallToolResult::json(&json!(all[start..])))
    });

    let store = Arc::clone(logs);
    register(
        core,
        "logs/errors",
        "Detected error clusters with code references",
        schema_limit,
        move |_args| Ok(CallToolResult::json(&json!(store.get_error_contexts()))),
    );
}

fn register_proxy_tools(core: &Arc<ServerCore>, proxy: &ProxyHandle) {
    let schema_limit = json!({
        "type": "object",
        "properties": {"limit": {"type": "integer"}}
    });
    let handle = proxy.clone();
    register(core, "proxy/requests", "Captured HTTP exchanges", schema_limit, move |args| {
        let limit = args["limit"].as_u64().unwrap_or(100) as usize;
        let all = handle.requests();
        let start = all.len().saturating_sub(limit);
        Ok(CallToolResult::json(&json!(all[start..])))
    });
}

fn register_resources(core: &Arc<ServerCore>, logs: &Arc<LogStore>, proxy: Option<&ProxyHandle>) {
    let store = Arc::clone(logs);
    core.resources.register(
        ResourceDef {
            uri: LOGS_RECENT_URI.to_string(),
            name: "Recent log entries".to_string(),
            description: Some("Newest captured output lines".to_string()),
            mime_type: Some("application/json".to_string()),
        },
        Arc::new(move || {
            let store = Arc::clone(&store);
            Box::pin(async move {
                let all = store.get_all();
                let start = all.len().saturating_sub(100);
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents {
                        uri: LOGS_RECENT_URI.to_string(),
                        mime_type: Some("application/json".to_string()),
                        text: Some(json!(all[start..]).to_string()),
                    }],
                })
            })
        }),
    );

    if let Some(proxy) = proxy {
        let handle = proxy.clone();
        core.resources.register(
            ResourceDef {
                uri: PROXY_REQUESTS_URI.to_string(),
                name: "Captured HTTP requests".to_string(),
                description: None,
                mime_type: Some("application/json".to_string()),
            },
            Arc::new(move || {
                let handle = handle.clone();
                Box::pin(async move {
                    Ok(ReadResourceResult {
                        contents: vec![ResourceContents {
                            uri: PROXY_REQUESTS_URI.to_string(),
                            mime_type: Some("application/json".to_string()),
                            text: Some(json!(handle.requests()).to_string()),
                        }],
                    })
                })
            }),
        );
    }
}

fn register_prompts(core: &Arc<ServerCore>, logs: &Arc<LogStore>) {
    let store = Arc::clone(logs);
    core.prompts.register(
        PromptDef {
            name: "debug_process".to_string(),
            description: Some("Debug a failing process from its captured errors".to_string()),
            arguments: vec![PromptArgument {
                name: "processId".to_string(),
                description: Some("Process to investigate".to_string()),
                required: true,
            }],
        },
        Arc::new(move |args| {
            let process_id = args
                .as_ref()
                .and_then(|a| a.get("processId"))
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::invalid_argument("processId is required"))?;
            let id = ProcessId::from_string(process_id);
            let contexts: Vec<_> = store
                .get_error_contexts()
                .into_iter()
                .filter(|c| c.process_id == id)
                .collect();
            let summary = if contexts.is_empty() {
                format!("No error clusters captured for {process_id} yet.")
            } else {
                contexts
                    .iter()
                    .map(|c| {
                        let reference = c
                            .code_reference
                            .as_ref()
                            .map(|f| f.reference())
                            .unwrap_or_else(|| "unknown location".to_string());
                        format!("- {} ({reference})", c.root_message)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Ok(GetPromptResult {
                description: Some(format!("Debugging context for {process_id}")),
                messages: vec![PromptMessage {
                    role: "user".to_string(),
                    content: ContentPart::text(format!(
                        "Process {process_id} reported these errors:\n{summary}\n\
                         Suggest the most likely root cause and a fix."
                    )),
                }],
            })
        }),
    );
}

/// Register a synchronous tool body.
fn register(
    core: &Arc<ServerCore>,
    name: &str,
    description: &str,
    schema: Value,
    body: impl Fn(Value) -> Result<CallToolResult, McpError> + Send + Sync + 'static,
) {
    let body = Arc::new(body);
    let result = core.tools.register(
        ToolDef {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: schema,
        },
        Arc::new(move |args, _ctx| {
            let body = Arc::clone(&body);
            Box::pin(async move { body(args) })
        }),
    );
    if let Err(e) = result {
        tracing::warn!(tool = name, error = %e, "tool registration failed");
    }
}

/// Register a tool whose body awaits.
fn register_async<F, Fut>(
    core: &Arc<ServerCore>,
    name: &str,
    description: &str,
    schema: Value,
    body: F,
) where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<CallToolResult, McpError>> + Send + 'static,
{
    let result = core.tools.register(
        ToolDef {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: schema,
        },
        Arc::new(move |args, _ctx| Box::pin(body(args))),
    );
    if let Err(e) = result {
        tracing::warn!(tool = name, error = %e, "tool registration failed");
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
