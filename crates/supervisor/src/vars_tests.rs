// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for `${VAR}` expansion in command lines.

use super::*;

#[test]
fn expands_injected_vars_first() {
    let injected = vec![("BRUMMER_MCP_PORT".to_string(), "7777".to_string())];
    assert_eq!(
        expand_vars("curl localhost:${BRUMMER_MCP_PORT}/mcp", &injected),
        "curl localhost:7777/mcp"
    );
}

#[test]
fn unknown_vars_are_left_verbatim() {
    assert_eq!(expand_vars("echo ${BRUM_TEST_NO_SUCH_VAR}", &[]), "echo ${BRUM_TEST_NO_SUCH_VAR}");
}

#[test]
fn unterminated_reference_is_left_verbatim() {
    assert_eq!(expand_vars("echo ${OOPS", &[]), "echo ${OOPS");
}

#[test]
fn plain_commands_pass_through() {
    assert_eq!(expand_vars("node server.js", &[]), "node server.js");
}
