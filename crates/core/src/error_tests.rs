// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for error-kind codes and serialization.

use super::*;

#[test]
fn codes_are_stable_and_distinct() {
    let kinds = [
        ErrorKind::InvalidArgument,
        ErrorKind::NotFound,
        ErrorKind::AlreadyExists,
        ErrorKind::PeerUnavailable,
        ErrorKind::NotConnected,
        ErrorKind::SpawnFailed,
        ErrorKind::StreamFailed,
        ErrorKind::Timeout,
        ErrorKind::Canceled,
        ErrorKind::ProtocolError,
        ErrorKind::Internal,
    ];
    let mut codes: Vec<i64> = kinds.iter().map(|k| k.code()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), kinds.len());
}

#[test]
fn serializes_kebab_case() {
    let json = serde_json::to_string(&ErrorKind::PeerUnavailable).unwrap();
    assert_eq!(json, "\"peer-unavailable\"");
}
