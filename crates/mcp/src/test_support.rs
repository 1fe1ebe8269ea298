// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for connection-manager, health, and hub tests.

use crate::client::{ClientError, PeerClient};
use crate::conn::Connector;
use async_trait::async_trait;
use brum_core::InstanceDescriptor;
use brum_wire::{
    CallToolResult, GetPromptResult, PromptsListResult, ReadResourceResult, ResourcesListResult,
    ToolDef, ToolsListResult,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Peer double: scripted tool list, observable calls, switchable ping.
pub struct FakeClient {
    pub name: String,
    pub tools: Vec<ToolDef>,
    pub ping_ok: AtomicBool,
    pub pings: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(name: &str, tool_names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tools: tool_names
                .iter()
                .map(|n| ToolDef {
                    name: n.to_string(),
                    description: Some(format!("peer tool on {name}")),
                    input_schema: json!({"type": "object"}),
                })
                .collect(),
            ping_ok: AtomicBool::new(true),
            pings: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PeerClient for FakeClient {
    async fn ping(&self) -> Result<(), ClientError> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        if self.ping_ok.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ClientError::Timeout)
        }
    }

    async fn list_tools(&self) -> Result<ToolsListResult, ClientError> {
        Ok(ToolsListResult { tools: self.tools.clone() })
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, ClientError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(CallToolResult::json(&json!({
            "peer": self.name,
            "tool": name,
            "args": args,
        })))
    }

    async fn list_resources(&self) -> Result<ResourcesListResult, ClientError> {
        Ok(ResourcesListResult { resources: Vec::new() })
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        Err(ClientError::Protocol(format!("no resource {uri}")))
    }

    async fn subscribe_resource(&self, _uri: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_prompts(&self) -> Result<PromptsListResult, ClientError> {
        Ok(PromptsListResult { prompts: Vec::new() })
    }

    async fn get_prompt(
        &self,
        name: &str,
        _args: Option<Value>,
    ) -> Result<GetPromptResult, ClientError> {
        Err(ClientError::Protocol(format!("no prompt {name}")))
    }

    async fn close(&self) {}
}

/// Connector that always hands out `client`.
pub fn connector_for(client: Arc<FakeClient>) -> Connector {
    Arc::new(move |_desc: InstanceDescriptor| {
        let client = Arc::clone(&client);
        Box::pin(async move { Ok(client as Arc<dyn PeerClient>) })
    })
}

/// Connector that fails the first `failures` attempts, then succeeds.
pub fn flaky_connector(client: Arc<FakeClient>, failures: usize) -> Connector {
    let attempts = Arc::new(AtomicUsize::new(0));
    Arc::new(move |_desc: InstanceDescriptor| {
        let client = Arc::clone(&client);
        let attempts = Arc::clone(&attempts);
        let failures = failures;
        Box::pin(async move {
            if attempts.fetch_add(1, Ordering::Relaxed) < failures {
                Err(ClientError::Protocol("connect refused".to_string()))
            } else {
                Ok(client as Arc<dyn PeerClient>)
            }
        })
    })
}

pub fn descriptor(name: &str, port: u16) -> InstanceDescriptor {
    InstanceDescriptor::new(name, std::env::temp_dir(), port)
}
