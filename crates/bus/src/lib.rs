// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed pub/sub event bus with a bounded worker pool
//!
//! Publishes fan out to subscribers of the event's kind through a pool of at
//! most `workers` concurrent dispatch tasks. Per-subscriber delivery is FIFO
//! (a subscriber has a serial queue drained by one drainer at a time). When
//! the pool is saturated, publish degrades to running the drain inline on
//! the publisher's thread, which bounds memory by borrowing the caller.
//!
//! Handlers are isolated: a panic in one handler is caught, reported as a
//! `system:message` event, and affects neither siblings nor the publisher.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use brum_core::{Event, EventKind};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

/// Handler invoked with an event snapshot. Must not retain the reference.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Returned by [`EventBus::subscribe`]; pass to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken {
    kind: EventKind,
    id: u64,
}

struct Subscriber {
    id: u64,
    handler: Handler,
    /// Serial queue preserving per-subscriber FIFO.
    queue: Mutex<VecDeque<Event>>,
    /// True while some drainer owns this subscriber's queue.
    draining: AtomicBool,
}

struct Inner {
    subscribers: RwLock<HashMap<EventKind, Vec<Arc<Subscriber>>>>,
    pool: Arc<Semaphore>,
    next_id: AtomicU64,
}

/// Cloneable bus handle. All clones share subscribers and the worker pool.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus with the default pool size, `ceil(cpus * 2.5)`.
    pub fn new() -> Self {
        Self::with_workers(0)
    }

    /// Create a bus with an explicit pool size (0 selects the default).
    pub fn with_workers(workers: usize) -> Self {
        let workers = if workers == 0 {
            (num_cpus::get() as f64 * 2.5).ceil() as usize
        } else {
            workers
        };
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                pool: Arc::new(Semaphore::new(workers.max(1))),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Safe to call concurrently with publishes; delivery to the new
    /// subscriber starts with the next publish.
    pub fn subscribe(&self, kind: EventKind, handler: Handler) -> SubscriptionToken {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscriber {
            id,
            handler,
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        });
        self.inner.subscribers.write().entry(kind).or_default().push(sub);
        SubscriptionToken { kind, id }
    }

    /// Remove a subscription. Effective no later than the next publish;
    /// in-flight dispatches to the handler are allowed to complete.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut map = self.inner.subscribers.write();
        if let Some(subs) = map.get_mut(&token.kind) {
            subs.retain(|s| s.id != token.id);
            if subs.is_empty() {
                map.remove(&token.kind);
            }
        }
    }

    /// Fan `event` out to all subscribers of its kind. Never fails.
    pub fn publish(&self, event: Event) {
        let subs: Vec<Arc<Subscriber>> = {
            let map = self.inner.subscribers.read();
            match map.get(&event.kind()) {
                Some(subs) => subs.clone(),
                None => return,
            }
        };

        for sub in subs {
            sub.queue.lock().push_back(event.clone());
            self.schedule_drain(sub);
        }
    }

    /// Run `sub`'s queue on the pool, or inline when the pool is saturated.
    fn schedule_drain(&self, sub: Arc<Subscriber>) {
        match Arc::clone(&self.inner.pool).try_acquire_owned() {
            Ok(permit) => {
                let bus = self.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            drain(&bus, &sub);
                            drop(permit);
                        });
                    }
                    // No runtime on this thread: dispatch synchronously.
                    Err(_) => {
                        drain(self, &sub);
                        drop(permit);
                    }
                }
            }
            // Pool saturated: back-pressure by borrowing the caller.
            Err(_) => drain(self, &sub),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a subscriber's queue, one drainer at a time.
///
/// The `draining` flag is the serialization point: losing the CAS means
/// another drainer owns the queue and will see anything we enqueued.
fn drain(bus: &EventBus, sub: &Subscriber) {
    loop {
        if sub
            .draining
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        while let Some(event) = { sub.queue.lock().pop_front() } {
            invoke(bus, &sub.handler, &event);
        }

        sub.draining.store(false, Ordering::Release);

        // Re-check: a publish may have enqueued between the final pop and
        // the flag release without being able to take the flag itself.
        if sub.queue.lock().is_empty() {
            return;
        }
    }
}

fn invoke(bus: &EventBus, handler: &Handler, event: &Event) {
    let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
    if result.is_err() {
        error!(event = event.name(), "event handler panicked");
        // Surface the failure as a system event, but never recursively for
        // failures inside system:message handlers.
        if event.kind() != EventKind::SystemMessage {
            bus.publish(Event::SystemMessage {
                level: "error".to_string(),
                message: format!("event handler panicked on {}", event.name()),
            });
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
