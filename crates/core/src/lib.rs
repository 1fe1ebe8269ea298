// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core types for the brummer supervisor
//!
//! Value types shared by every other crate: events, process records, log
//! entries, error contexts, proxy captures, instance descriptors, and the
//! configuration struct assembled at startup.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod error;
mod error_context;
mod event;
mod instance;
mod log;
mod process;
mod proxy;
mod url;

pub use config::Config;
pub use error::ErrorKind;
pub use error_context::{ErrorContext, ErrorSeverity, StackFrame};
pub use event::{Event, EventKind};
pub use instance::{InstanceDescriptor, ProcessInfo};
pub use log::{LogEntry, LogFilter, LogPriority, LogTag};
pub use process::{ProcessId, ProcessRecord, ProcessStatus};
pub use proxy::{ProxyMapping, ProxyRequest, RequestKind};
pub use url::UrlEntry;
