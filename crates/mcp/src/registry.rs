// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool, resource, and prompt registries
//!
//! Name → handler maps with dynamic register/unregister. Tool arguments are
//! validated against the tool's JSON schema (required keys plus primitive
//! type checks) before the handler runs.

use crate::session::SessionCtx;
use brum_core::ErrorKind;
use brum_wire::{
    CallToolResult, GetPromptResult, PromptDef, ReadResourceResult, ResourceDef, ToolDef,
};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Error surfaced through the protocol with a stable code.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct McpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl McpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// A tool handler: validated arguments plus session context, async result.
pub type ToolHandler = Arc<
    dyn Fn(Value, SessionCtx) -> BoxFuture<'static, Result<CallToolResult, McpError>>
        + Send
        + Sync,
>;

/// A resource reader producing the current contents for its URI.
pub type ResourceReader =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ReadResourceResult, McpError>> + Send + Sync>;

/// A prompt builder: optional arguments to rendered messages.
pub type PromptBuilder =
    Arc<dyn Fn(Option<Value>) -> Result<GetPromptResult, McpError> + Send + Sync>;

struct ToolEntry {
    def: ToolDef,
    handler: ToolHandler,
}

/// Dynamic name → tool map.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<BTreeMap<String, ToolEntry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are namespaced with `/` or `_`.
    pub fn register(&self, def: ToolDef, handler: ToolHandler) -> Result<(), McpError> {
        if !valid_name(&def.name) {
            return Err(McpError::invalid_argument(format!("invalid tool name: {}", def.name)));
        }
        self.entries.write().insert(def.name.clone(), ToolEntry { def, handler });
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn list(&self) -> Vec<ToolDef> {
        self.entries.read().values().map(|e| e.def.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<(ToolDef, ToolHandler)> {
        self.entries
            .read()
            .get(name)
            .map(|e| (e.def.clone(), Arc::clone(&e.handler)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }
}

struct ResourceEntry {
    def: ResourceDef,
    reader: ResourceReader,
}

#[derive(Default)]
pub struct ResourceRegistry {
    entries: RwLock<BTreeMap<String, ResourceEntry>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: ResourceDef, reader: ResourceReader) {
        self.entries.write().insert(def.uri.clone(), ResourceEntry { def, reader });
    }

    pub fn list(&self) -> Vec<ResourceDef> {
        self.entries.read().values().map(|e| e.def.clone()).collect()
    }

    pub fn reader(&self, uri: &str) -> Option<ResourceReader> {
        self.entries.read().get(uri).map(|e| Arc::clone(&e.reader))
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains_key(uri)
    }
}

struct PromptEntry {
    def: PromptDef,
    builder: PromptBuilder,
}

#[derive(Default)]
pub struct PromptRegistry {
    entries: RwLock<BTreeMap<String, PromptEntry>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: PromptDef, builder: PromptBuilder) {
        self.entries.write().insert(def.name.clone(), PromptEntry { def, builder });
    }

    pub fn list(&self) -> Vec<PromptDef> {
        self.entries.read().values().map(|e| e.def.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<(PromptDef, PromptBuilder)> {
        self.entries
            .read()
            .get(name)
            .map(|e| (e.def.clone(), Arc::clone(&e.builder)))
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.'))
}

/// Validate `args` against a JSON-schema object: required keys must be
/// present and declared property types must match.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Ok(());
    }
    let empty = serde_json::Map::new();
    let args_obj = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err("arguments must be an object".to_string()),
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args_obj.contains_key(key) {
                return Err(format!("missing required argument: {key}"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop) in props {
            let Some(value) = args_obj.get(key) else { continue };
            let Some(expected) = prop.get("type").and_then(Value::as_str) else { continue };
            if !type_matches(expected, value) {
                return Err(format!("argument {key} must be of type {expected}"));
            }
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
