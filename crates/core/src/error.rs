// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds surfaced across component boundaries
//!
//! Each kind maps to a stable numeric code on the tool protocol. Messages
//! are human-readable; stack traces are never exposed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("peer unavailable")]
    PeerUnavailable,
    #[error("not connected")]
    NotConnected,
    #[error("spawn failed")]
    SpawnFailed,
    #[error("stream failed")]
    StreamFailed,
    #[error("timeout")]
    Timeout,
    #[error("canceled")]
    Canceled,
    #[error("protocol error")]
    ProtocolError,
    #[error("internal error")]
    Internal,
}

impl ErrorKind {
    /// Stable JSON-RPC error code. `-32602`/`-32600` reuse the standard
    /// codes; the rest live in the implementation-defined range.
    pub fn code(self) -> i64 {
        match self {
            Self::InvalidArgument => -32602,
            Self::ProtocolError => -32600,
            Self::NotFound => -32001,
            Self::AlreadyExists => -32002,
            Self::PeerUnavailable => -32003,
            Self::NotConnected => -32004,
            Self::SpawnFailed => -32005,
            Self::StreamFailed => -32006,
            Self::Timeout => -32007,
            Self::Canceled => -32008,
            Self::Internal => -32603,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid-argument",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::PeerUnavailable => "peer-unavailable",
            Self::NotConnected => "not-connected",
            Self::SpawnFailed => "spawn-failed",
            Self::StreamFailed => "stream-failed",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::ProtocolError => "protocol-error",
            Self::Internal => "internal",
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
