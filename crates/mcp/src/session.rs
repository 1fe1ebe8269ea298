// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session table for the tool transports
//!
//! A session is created on first contact (or when a client presents an
//! unknown id), expires on idleness, and owns its resource subscriptions
//! and its server-to-client event stream.

use brum_wire::JsonRpcRequest;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Per-call context handed to tool handlers.
#[derive(Debug, Clone)]
pub struct SessionCtx {
    pub session_id: String,
}

struct Session {
    last_activity: Instant,
    /// Server-to-client stream, present while a GET stream is attached.
    stream: Option<mpsc::Sender<JsonRpcRequest>>,
    /// Subscribed resource URIs.
    subscriptions: HashSet<String>,
}

/// Concurrent session table with idle expiry.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<HashMap<String, Session>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), idle_timeout }
    }

    /// Spawn the expiry sweeper; sessions idle past the timeout are dropped
    /// together with their subscriptions and streams.
    pub fn start_sweeper(&self, cancel: &CancellationToken) {
        let manager = self.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let period = manager.idle_timeout.min(Duration::from_secs(60));
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {}
                }
                let cutoff = manager.idle_timeout;
                let mut sessions = manager.inner.lock();
                let before = sessions.len();
                sessions.retain(|_, s| s.last_activity.elapsed() < cutoff);
                let expired = before - sessions.len();
                if expired > 0 {
                    debug!(expired, "expired idle sessions");
                }
            }
        });
    }

    /// Resolve the session for a request, creating one as needed.
    pub fn resolve(&self, header: Option<&str>) -> String {
        let mut sessions = self.inner.lock();
        if let Some(id) = header {
            if let Some(session) = sessions.get_mut(id) {
                session.last_activity = Instant::now();
                return id.to_string();
            }
        }
        let id = header
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        sessions.insert(
            id.clone(),
            Session {
                last_activity: Instant::now(),
                stream: None,
                subscriptions: HashSet::new(),
            },
        );
        id
    }

    pub fn touch(&self, id: &str) {
        if let Some(session) = self.inner.lock().get_mut(id) {
            session.last_activity = Instant::now();
        }
    }

    /// Attach (or replace) the server-to-client stream for a session.
    pub fn attach_stream(&self, id: &str) -> mpsc::Receiver<JsonRpcRequest> {
        let (tx, rx) = mpsc::channel(64);
        let mut sessions = self.inner.lock();
        let session = sessions.entry(id.to_string()).or_insert_with(|| Session {
            last_activity: Instant::now(),
            stream: None,
            subscriptions: HashSet::new(),
        });
        session.stream = Some(tx);
        rx
    }

    pub fn subscribe(&self, id: &str, uri: &str) -> bool {
        match self.inner.lock().get_mut(id) {
            Some(session) => {
                session.subscriptions.insert(uri.to_string());
                true
            }
            None => false,
        }
    }

    /// Queue a notification to every session subscribed to `uri`.
    pub fn notify_resource_updated(&self, uri: &str) {
        let note = JsonRpcRequest::notification(
            brum_wire::NOTIFICATION_RESOURCE_UPDATED,
            Some(serde_json::json!({ "uri": uri })),
        );
        let sessions = self.inner.lock();
        for session in sessions.values() {
            if session.subscriptions.contains(uri) {
                if let Some(stream) = &session.stream {
                    let _ = stream.try_send(note.clone());
                }
            }
        }
    }

    /// Push a notification onto one session's stream, if attached.
    pub fn push(&self, id: &str, note: JsonRpcRequest) {
        if let Some(session) = self.inner.lock().get(id) {
            if let Some(stream) = &session.stream {
                let _ = stream.try_send(note);
            }
        }
    }

    /// Close a session: drops its stream and subscriptions.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
