// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded ring of captured exchanges

use brum_bus::EventBus;
use brum_core::{Event, ProxyRequest, RequestKind};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::collections::HashMap;

/// Headers worth retaining on a capture.
const KEPT_HEADERS: &[&str] = &[
    "accept",
    "content-type",
    "sec-fetch-mode",
    "x-requested-with",
    "referer",
    "user-agent",
];

/// Bounded capture ring plus telemetry-session correlation.
pub struct RequestLedger {
    inner: Mutex<LedgerInner>,
    bus: EventBus,
    capacity: usize,
}

struct LedgerInner {
    ring: VecDeque<ProxyRequest>,
    next_id: u64,
    /// origin host → telemetry session, applied to subsequent captures.
    sessions: HashMap<String, String>,
}

/// Everything known about one exchange at capture time.
pub struct CaptureInput {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub duration_ms: u64,
    pub request_size: u64,
    pub response_size: u64,
    pub headers: Vec<(String, String)>,
    pub body_excerpt: Option<String>,
    pub kind: RequestKind,
}

impl RequestLedger {
    pub fn new(capacity: usize, bus: EventBus) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                ring: VecDeque::new(),
                next_id: 1,
                sessions: HashMap::new(),
            }),
            bus,
            capacity: capacity.max(1),
        }
    }

    /// Record an exchange and emit exactly one `proxy:request` event.
    pub fn record(&self, input: CaptureInput) -> ProxyRequest {
        let request = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;

            let mut headers = BTreeMap::new();
            for (name, value) in input.headers {
                let name = name.to_ascii_lowercase();
                if KEPT_HEADERS.contains(&name.as_str()) {
                    headers.insert(name, value);
                }
            }

            let telemetry_session =
                origin_of(&input.url).and_then(|o| inner.sessions.get(&o).cloned());

            let request = ProxyRequest {
                id,
                method: input.method,
                url: input.url,
                status: input.status,
                duration_ms: input.duration_ms,
                request_size: input.request_size,
                response_size: input.response_size,
                headers,
                body_excerpt: input.body_excerpt,
                kind: input.kind,
                started_at: Utc::now(),
                telemetry_session,
            };
            inner.ring.push_back(request.clone());
            while inner.ring.len() > self.capacity {
                inner.ring.pop_front();
            }
            request
        };

        self.bus.publish(Event::ProxyRequest { request: Box::new(request.clone()) });
        request
    }

    /// Bind a telemetry session to an origin and backfill the most recent
    /// capture from that origin.
    pub fn correlate(&self, origin: &str, session: &str) {
        let mut inner = self.inner.lock();
        inner.sessions.insert(origin.to_string(), session.to_string());
        if let Some(last) = inner
            .ring
            .iter_mut()
            .rev()
            .find(|r| origin_of(&r.url).as_deref() == Some(origin))
        {
            last.telemetry_session = Some(session.to_string());
        }
    }

    /// Snapshot, oldest first.
    pub fn requests(&self) -> Vec<ProxyRequest> {
        self.inner.lock().ring.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `scheme://host[:port]` portion of a URL.
pub(crate) fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?']).next()?;
    Some(format!("{scheme}://{host}"))
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
