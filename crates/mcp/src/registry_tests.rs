// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for registry operations and schema validation.

use super::*;
use serde_json::json;
use yare::parameterized;

fn tool(name: &str) -> ToolDef {
    ToolDef {
        name: name.to_string(),
        description: None,
        input_schema: json!({"type": "object"}),
    }
}

fn noop_handler() -> ToolHandler {
    Arc::new(|_, _| Box::pin(async { Ok(CallToolResult::text("ok")) }))
}

#[test]
fn register_list_unregister() {
    let reg = ToolRegistry::new();
    reg.register(tool("scripts/list"), noop_handler()).unwrap();
    reg.register(tool("scripts_run"), noop_handler()).unwrap();

    let names: Vec<String> = reg.list().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["scripts/list".to_string(), "scripts_run".to_string()]);

    assert!(reg.unregister("scripts/list"));
    assert!(!reg.unregister("scripts/list"), "second unregister is a no-op");
    assert!(!reg.contains("scripts/list"));
}

#[parameterized(
    empty = { "" },
    spaces = { "has space" },
    shell_meta = { "rm;-rf" },
)]
fn invalid_tool_names_are_rejected(name: &str) {
    let reg = ToolRegistry::new();
    let err = reg.register(tool(name), noop_handler()).unwrap_err();
    assert_eq!(err.kind, brum_core::ErrorKind::InvalidArgument);
}

#[test]
fn validate_requires_declared_keys() {
    let schema = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    });
    assert!(validate_args(&schema, &json!({"name": "dev"})).is_ok());
    let err = validate_args(&schema, &json!({})).unwrap_err();
    assert!(err.contains("name"));
}

#[parameterized(
    wrong_string = { json!({"name": 42}), false },
    right_string = { json!({"name": "dev"}), true },
    extra_keys_ok = { json!({"name": "dev", "other": 1}), true },
)]
fn validate_checks_types(args: serde_json::Value, ok: bool) {
    let schema = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    });
    assert_eq!(validate_args(&schema, &args).is_ok(), ok);
}

#[test]
fn null_args_pass_when_nothing_required() {
    let schema = json!({"type": "object", "properties": {}});
    assert!(validate_args(&schema, &serde_json::Value::Null).is_ok());
}

#[test]
fn non_object_args_are_rejected() {
    let schema = json!({"type": "object"});
    assert!(validate_args(&schema, &json!([1, 2])).is_err());
}
