// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer liveness via protocol ping
//!
//! Pings every `active` peer on an interval with a per-ping timeout. After
//! `failure_budget` consecutive timeouts the peer is handed back to the
//! connection manager as unhealthy; recovery is the manager's reconnect
//! logic, not ours.

use crate::conn::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct HealthMonitor {
    conn: ConnectionManager,
    interval: Duration,
    timeout: Duration,
    failure_budget: u32,
}

impl HealthMonitor {
    pub fn new(
        conn: ConnectionManager,
        interval: Duration,
        timeout: Duration,
        failure_budget: u32,
    ) -> Self {
        Self { conn, interval, timeout, failure_budget: failure_budget.max(1) }
    }

    /// Spawn the monitor loop.
    pub fn start(self, cancel: &CancellationToken) {
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let mut failures: HashMap<String, u32> = HashMap::new();
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {}
                }
                self.sweep(&mut failures).await;
            }
        });
    }

    async fn sweep(&self, failures: &mut HashMap<String, u32>) {
        let actives = self.conn.active_clients().await;
        // Forget counters for peers no longer active.
        failures.retain(|id, _| actives.iter().any(|(aid, _)| aid == id));

        for (id, client) in actives {
            let ok = tokio::time::timeout(self.timeout, client.ping()).await;
            match ok {
                Ok(Ok(())) => {
                    failures.remove(&id);
                    self.conn.record_activity(&id).await;
                }
                Ok(Err(e)) => {
                    self.note_failure(failures, &id, &format!("ping failed: {e}")).await;
                }
                Err(_) => {
                    self.note_failure(failures, &id, "ping timed out").await;
                }
            }
        }
    }

    async fn note_failure(&self, failures: &mut HashMap<String, u32>, id: &str, reason: &str) {
        let count = failures.entry(id.to_string()).or_insert(0);
        *count += 1;
        debug!(id, count = *count, reason, "peer ping failure");
        if *count >= self.failure_budget {
            failures.remove(id);
            self.conn.mark_unhealthy(id, reason).await;
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
