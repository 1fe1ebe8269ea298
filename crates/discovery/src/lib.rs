// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem rendezvous for peer instances
//!
//! Each live instance writes `<runtime-dir>/brummer/instances/<id>.json`
//! atomically (temp + fsync + rename). A notify watcher reacts to
//! create/modify/delete; a periodic sweep reconciles missed events and
//! removes stale descriptors (old `last_seen` or dead pid).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod registration;
mod watch;

pub use registration::Registration;
pub use watch::{Discovery, DiscoveryEvent};

use brum_core::InstanceDescriptor;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors from the discovery layer.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery directory unavailable: {0}")]
    Directory(std::io::Error),

    #[error("descriptor write failed: {0}")]
    Write(std::io::Error),

    #[error("watcher failed: {0}")]
    Watcher(#[from] notify::Error),
}

/// Default rendezvous directory: `<runtime-dir>/brummer/instances`, with
/// the system temp dir as a fallback for platforms without a runtime dir.
pub fn default_instances_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("brummer")
        .join("instances")
}

/// Create the rendezvous directory (0755) if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), DiscoveryError> {
    fs::create_dir_all(dir).map_err(DiscoveryError::Directory)
}

pub(crate) fn descriptor_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.json"))
}

/// Atomic descriptor write: temp file, fsync, rename into place.
pub(crate) fn write_descriptor(
    dir: &Path,
    desc: &InstanceDescriptor,
) -> Result<(), DiscoveryError> {
    let path = descriptor_path(dir, &desc.id);
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(desc)
        .map_err(|e| DiscoveryError::Write(std::io::Error::other(e)))?;
    let mut file = fs::File::create(&tmp).map_err(DiscoveryError::Write)?;
    file.write_all(&body).map_err(DiscoveryError::Write)?;
    file.sync_all().map_err(DiscoveryError::Write)?;
    fs::rename(&tmp, &path).map_err(DiscoveryError::Write)?;
    Ok(())
}

pub(crate) fn read_descriptor(path: &Path) -> Option<InstanceDescriptor> {
    let body = fs::read(path).ok()?;
    serde_json::from_slice(&body).ok()
}

/// Whether the recorded pid corresponds to a live process.
pub(crate) fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
