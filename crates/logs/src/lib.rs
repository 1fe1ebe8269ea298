// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory log store with async intake
//!
//! `add` is fire-and-forget onto a bounded channel; a single intake worker
//! assigns ids, appends to the ring, runs the error and URL extractors, and
//! re-emits derived events on the bus. When the channel is full, ingest runs
//! synchronously on the caller.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod detect;
mod extract;
mod store;

pub use detect::ErrorDetector;
pub use extract::{LineClass, UrlExtractor};
pub use store::{LogStore, LogStream, SearchError};
