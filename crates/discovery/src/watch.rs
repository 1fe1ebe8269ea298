// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watcher and reconciliation sweep over the rendezvous directory

use crate::{pid_alive, read_descriptor, DiscoveryError};
use brum_core::InstanceDescriptor;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Operations emitted to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Appeared(InstanceDescriptor),
    Disappeared(String),
}

/// Watches the rendezvous directory for peer instances.
pub struct Discovery {
    known: Arc<Mutex<HashMap<String, InstanceDescriptor>>>,
    /// Kept alive for the watcher thread; dropped on shutdown.
    _watcher: RecommendedWatcher,
}

impl Discovery {
    /// Start watching `dir`. Returns the handle and the event stream.
    ///
    /// `ignore_id` filters out this instance's own descriptor (a hub passes
    /// `None`).
    pub fn start(
        dir: PathBuf,
        ignore_id: Option<String>,
        stale_after: Duration,
        sweep_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<DiscoveryEvent>), DiscoveryError> {
        crate::ensure_dir(&dir)?;

        let known: Arc<Mutex<HashMap<String, InstanceDescriptor>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(64);

        // Bridge notify's callback thread into the async world.
        let (fs_tx, mut fs_rx) = mpsc::channel::<()>(16);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                // Coalesce: the reconciler rescans the whole directory.
                let _ = fs_tx.blocking_send(());
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let state = SweepState {
            dir,
            ignore_id,
            stale_after,
            known: Arc::clone(&known),
            events: events_tx,
        };
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            // Initial scan picks up instances that started before us.
            state.reconcile().await;
            let mut tick = tokio::time::interval(sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {}
                    changed = fs_rx.recv() => {
                        if changed.is_none() {
                            return;
                        }
                    }
                }
                state.reconcile().await;
            }
        });

        Ok((Self { known, _watcher: watcher }, events_rx))
    }

    /// Currently known live descriptors.
    pub fn instances(&self) -> Vec<InstanceDescriptor> {
        self.known.lock().values().cloned().collect()
    }
}

struct SweepState {
    dir: PathBuf,
    ignore_id: Option<String>,
    stale_after: Duration,
    known: Arc<Mutex<HashMap<String, InstanceDescriptor>>>,
    events: mpsc::Sender<DiscoveryEvent>,
}

impl SweepState {
    /// Rescan the directory: emit appearances, drop stale descriptors,
    /// emit disappearances for removed files.
    async fn reconcile(&self) {
        let mut on_disk: HashMap<String, InstanceDescriptor> = HashMap::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "discovery scan failed");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(desc) = read_descriptor(&path) else {
                debug!(path = %path.display(), "unparseable descriptor ignored");
                continue;
            };
            if self.ignore_id.as_deref() == Some(desc.id.as_str()) {
                continue;
            }
            if self.is_stale(&desc) {
                info!(id = %desc.id, "removing stale descriptor");
                let _ = std::fs::remove_file(&path);
                continue;
            }
            on_disk.insert(desc.id.clone(), desc);
        }

        let (appeared, disappeared) = {
            let mut known = self.known.lock();
            let appeared: Vec<InstanceDescriptor> = on_disk
                .values()
                .filter(|d| !known.contains_key(&d.id))
                .cloned()
                .collect();
            let disappeared: Vec<String> =
                known.keys().filter(|id| !on_disk.contains_key(*id)).cloned().collect();
            *known = on_disk;
            (appeared, disappeared)
        };

        for desc in appeared {
            info!(id = %desc.id, name = %desc.name, port = desc.port, "instance appeared");
            let _ = self.events.send(DiscoveryEvent::Appeared(desc)).await;
        }
        for id in disappeared {
            info!(id = %id, "instance disappeared");
            let _ = self.events.send(DiscoveryEvent::Disappeared(id)).await;
        }
    }

    fn is_stale(&self, desc: &InstanceDescriptor) -> bool {
        desc.is_stale(self.stale_after.as_secs()) || !pid_alive(desc.process_info.pid)
    }
}
