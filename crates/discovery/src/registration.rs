// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local instance registration and heartbeat

use crate::{descriptor_path, write_descriptor, DiscoveryError};
use brum_core::InstanceDescriptor;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Keeps this instance's descriptor on disk and its `last_seen` fresh.
pub struct Registration {
    dir: PathBuf,
    descriptor: Arc<Mutex<InstanceDescriptor>>,
    cancel: CancellationToken,
}

impl Registration {
    /// Write the descriptor and start the heartbeat task.
    pub fn start(
        dir: PathBuf,
        descriptor: InstanceDescriptor,
        heartbeat: Duration,
        parent: &CancellationToken,
    ) -> Result<Self, DiscoveryError> {
        crate::ensure_dir(&dir)?;
        write_descriptor(&dir, &descriptor)?;

        let descriptor = Arc::new(Mutex::new(descriptor));
        let cancel = parent.child_token();

        let beat_dir = dir.clone();
        let beat_desc = Arc::clone(&descriptor);
        let beat_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(heartbeat);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tick.tick().await; // immediate first tick
            loop {
                tokio::select! {
                    _ = beat_cancel.cancelled() => return,
                    _ = tick.tick() => {}
                }
                let fresh = {
                    let mut desc = beat_desc.lock();
                    desc.last_seen = chrono::Utc::now();
                    desc.clone()
                };
                if let Err(e) = write_descriptor(&beat_dir, &fresh) {
                    warn!(error = %e, "descriptor heartbeat failed");
                }
            }
        });

        Ok(Self { dir, descriptor, cancel })
    }

    pub fn id(&self) -> String {
        self.descriptor.lock().id.clone()
    }

    /// Stop the heartbeat and remove the descriptor file.
    pub fn unregister(&self) {
        self.cancel.cancel();
        let path = descriptor_path(&self.dir, &self.descriptor.lock().id);
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "descriptor removal failed");
        }
    }
}
