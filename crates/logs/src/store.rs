// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The log ring and its intake path
//!
//! Writes funnel through [`LogStore::add`]: enqueue onto a bounded channel
//! drained by one intake worker, or ingest synchronously on the caller when
//! the channel is full. Ids are assigned under the ring's write lock, so
//! they are strictly increasing regardless of which path ran.
//!
//! Lock order: ring → extractors → contexts/urls. No lock is held across a
//! bus publish or a channel send.

use crate::detect::ErrorDetector;
use crate::extract::{LineClass, UrlExtractor};
use brum_bus::EventBus;
use brum_core::{
    Config, ErrorContext, Event, LogEntry, LogFilter, LogPriority, ProcessId, UrlEntry,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Search failures surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

struct Ring {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

struct Extractors {
    detector: ErrorDetector,
    urls: UrlExtractor,
}

struct Inner {
    capacity: usize,
    ring: RwLock<Ring>,
    extractors: Mutex<Extractors>,
    contexts: RwLock<Vec<ErrorContext>>,
    urls: RwLock<Vec<UrlEntry>>,
    bus: EventBus,
    live: broadcast::Sender<LogEntry>,
}

struct IngestJob {
    process_id: ProcessId,
    process_name: String,
    text: String,
    is_error: bool,
}

/// Bounded in-memory log store with async intake.
pub struct LogStore {
    inner: Arc<Inner>,
    intake: mpsc::Sender<IngestJob>,
}

impl LogStore {
    /// Create the store and spawn its intake worker on the current runtime.
    pub fn new(config: &Config, bus: EventBus) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.log_intake_capacity.max(1));
        let (live, _) = broadcast::channel(256);
        let inner = Arc::new(Inner {
            capacity: config.log_ring_capacity.max(1),
            ring: RwLock::new(Ring { entries: VecDeque::new(), next_id: 1 }),
            extractors: Mutex::new(Extractors {
                detector: ErrorDetector::new(
                    config.error_cluster_gap,
                    config.vendor_paths.clone(),
                ),
                urls: UrlExtractor::new(),
            }),
            contexts: RwLock::new(Vec::new()),
            urls: RwLock::new(Vec::new()),
            bus,
            live,
        });

        tokio::spawn(intake_loop(Arc::clone(&inner), rx));

        Arc::new(Self { inner, intake: tx })
    }

    /// Queue a line for ingest. Fire-and-forget; when the intake channel is
    /// full the ingest runs synchronously on this thread instead.
    pub fn add(&self, process_id: ProcessId, process_name: &str, text: &str, is_error: bool) {
        let job = IngestJob {
            process_id,
            process_name: process_name.to_string(),
            text: text.to_string(),
            is_error,
        };
        if let Err(mpsc::error::TrySendError::Full(job)) = self.intake.try_send(job) {
            debug!("log intake channel full, ingesting inline");
            ingest(&self.inner, job);
        }
        // A closed channel means shutdown; the line is dropped.
    }

    /// Snapshot of all retained entries, oldest first.
    pub fn get_all(&self) -> Vec<LogEntry> {
        self.inner.ring.read().entries.iter().cloned().collect()
    }

    pub fn get_by_process(&self, id: &ProcessId) -> Vec<LogEntry> {
        self.inner
            .ring
            .read()
            .entries
            .iter()
            .filter(|e| e.process_id == *id)
            .cloned()
            .collect()
    }

    pub fn get_errors(&self) -> Vec<LogEntry> {
        self.inner.ring.read().entries.iter().filter(|e| e.is_error).cloned().collect()
    }

    /// Regex search over retained entries.
    pub fn search(
        &self,
        pattern: &str,
        since: Option<DateTime<Utc>>,
        process: Option<&ProcessId>,
    ) -> Result<Vec<LogEntry>, SearchError> {
        let re = regex::Regex::new(pattern)?;
        Ok(self
            .inner
            .ring
            .read()
            .entries
            .iter()
            .filter(|e| since.is_none_or(|s| e.timestamp >= s))
            .filter(|e| process.is_none_or(|p| e.process_id == *p))
            .filter(|e| re.is_match(&e.text))
            .cloned()
            .collect())
    }

    pub fn get_error_contexts(&self) -> Vec<ErrorContext> {
        self.inner.contexts.read().clone()
    }

    pub fn get_urls(&self) -> Vec<UrlEntry> {
        self.inner.urls.read().clone()
    }

    /// Live stream of entries matching `filter`.
    pub fn subscribe(&self, filter: LogFilter) -> LogStream {
        LogStream { rx: self.inner.live.subscribe(), filter }
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.ring.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close any open error cluster immediately (used on process exit).
    pub fn flush_errors(&self) {
        let closed = self.inner.extractors.lock().detector.close();
        if let Some(ctx) = closed {
            publish_context(&self.inner, ctx);
        }
    }

    /// Drop URL dedup state for a process (restart re-announces its URLs).
    pub fn forget_process_urls(&self, id: &ProcessId) {
        self.inner.extractors.lock().urls.forget(id);
    }
}

/// Live subscription returned by [`LogStore::subscribe`].
pub struct LogStream {
    rx: broadcast::Receiver<LogEntry>,
    filter: LogFilter,
}

impl LogStream {
    /// Next matching entry, or `None` once the store is gone. Entries missed
    /// under overload are skipped (the ring is the source of truth).
    pub async fn recv(&mut self) -> Option<LogEntry> {
        loop {
            match self.rx.recv().await {
                Ok(entry) if self.filter.matches(&entry) => return Some(entry),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Intake worker: drain jobs, flush expired error clusters on a timer.
async fn intake_loop(inner: Arc<Inner>, mut rx: mpsc::Receiver<IngestJob>) {
    loop {
        let deadline = inner.extractors.lock().detector.deadline();
        let job = match deadline {
            Some(at) => {
                tokio::select! {
                    job = rx.recv() => job,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(at)) => {
                        let closed = inner.extractors.lock().detector.flush_expired();
                        if let Some(ctx) = closed {
                            publish_context(&inner, ctx);
                        }
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };
        match job {
            Some(job) => ingest(&inner, job),
            None => return,
        }
    }
}

/// The single ingest path, shared by the worker and the overflow fallback.
fn ingest(inner: &Inner, job: IngestJob) {
    let text = sanitize(&job.text);
    let class = LineClass::of(&text);

    let entry = {
        let mut ring = inner.ring.write();
        let id = ring.next_id;
        ring.next_id += 1;

        let (is_error, priority) = {
            let ex = inner.extractors.lock();
            let detected = ex.detector.is_error_line(&text);
            let is_error = job.is_error || detected;
            let priority = if is_error {
                LogPriority::Error
            } else if ex.detector.is_warning_line(&text) {
                LogPriority::Warning
            } else {
                LogPriority::Normal
            };
            (is_error, priority)
        };

        let entry = LogEntry {
            id,
            process_id: job.process_id.clone(),
            process_name: job.process_name.clone(),
            text,
            timestamp: Utc::now(),
            is_error,
            priority,
            tags: class.tag().into_iter().collect(),
        };
        ring.entries.push_back(entry.clone());
        while ring.entries.len() > inner.capacity {
            ring.entries.pop_front();
        }
        entry
    };

    let _ = inner.live.send(entry.clone());
    inner.bus.publish(Event::LogLine {
        process_id: entry.process_id.clone(),
        process_name: entry.process_name.clone(),
        text: entry.text.clone(),
        is_error: entry.is_error,
    });

    match &class {
        LineClass::Build => inner.bus.publish(Event::BuildEvent {
            process_id: entry.process_id.clone(),
            line: entry.text.clone(),
        }),
        LineClass::TestStarted(name) => inner.bus.publish(Event::TestStarted {
            process_id: entry.process_id.clone(),
            test_name: name.clone(),
        }),
        LineClass::TestPassed(name) => inner.bus.publish(Event::TestPassed {
            process_id: entry.process_id.clone(),
            test_name: name.clone(),
        }),
        LineClass::TestFailed(name) => inner.bus.publish(Event::TestFailed {
            process_id: entry.process_id.clone(),
            test_name: name.clone(),
            detail: None,
        }),
        LineClass::Plain => {}
    }

    let (closed, new_urls) = {
        let mut ex = inner.extractors.lock();
        let closed = ex.detector.feed(&entry);
        let new_urls = ex.urls.extract(&entry.process_id, &entry.text);
        (closed, new_urls)
    };

    if let Some(ctx) = closed {
        publish_context(inner, ctx);
    }
    for url in new_urls {
        inner.urls.write().push(url.clone());
        inner.bus.publish(Event::UrlDetected {
            process_id: url.process_id,
            url: url.url,
            label: url.label,
        });
    }
}

fn publish_context(inner: &Inner, ctx: ErrorContext) {
    inner.contexts.write().push(ctx.clone());
    inner.bus.publish(Event::ErrorDetected { context: ctx });
}

/// Strip transport framing: `\r` and other C0 control bytes, keeping `\t`
/// and ANSI escape sequences intact.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\t' || c == '\x1b' || !c.is_control())
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
