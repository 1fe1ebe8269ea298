// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor
//!
//! Spawns package-script commands in their own process group, streams their
//! stdout/stderr line-by-line into a log sink, and reaps them with two-phase
//! group-kill semantics (SIGINT, grace period, SIGKILL).
//!
//! Lock order: registry → record. Neither lock is held across an `.await`
//! or a bus publish. Waiters observe status through a `watch` channel per
//! record instead of polling.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod child;
mod vars;

pub use vars::expand_vars;

use brum_bus::EventBus;
use brum_core::{ErrorKind, Event, ProcessId, ProcessRecord, ProcessStatus};
use child::LineSplitter;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Sink for captured output lines: (process id, display name, line, is_error).
pub type LogSink = Arc<dyn Fn(&ProcessId, &str, &str, bool) + Send + Sync>;

/// Errors surfaced from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown process: {0}")]
    NotFound(ProcessId),
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } => ErrorKind::SpawnFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Result of a `start` call. `duplicate` is set when the script was already
/// running and the existing record was returned instead of a new spawn.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub record: ProcessRecord,
    pub duplicate: bool,
}

struct ProcessHandle {
    record: Mutex<ProcessRecord>,
    status_tx: watch::Sender<ProcessStatus>,
    status_rx: watch::Receiver<ProcessStatus>,
    stop_requested: AtomicBool,
    /// Process-group id (== pid, the child leads its own group).
    pgid: Mutex<Option<i32>>,
}

struct Inner {
    registry: RwLock<HashMap<ProcessId, Arc<ProcessHandle>>>,
    seq: AtomicU64,
    bus: EventBus,
    sink: LogSink,
    extra_env: Vec<(String, String)>,
    stop_grace: Duration,
    max_line_bytes: usize,
}

/// Cloneable supervisor handle.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(
        bus: EventBus,
        sink: LogSink,
        extra_env: Vec<(String, String)>,
        stop_grace: Duration,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(HashMap::new()),
                seq: AtomicU64::new(1),
                bus,
                sink,
                extra_env,
                stop_grace,
                max_line_bytes: max_line_bytes.max(1),
            }),
        }
    }

    /// Spawn `command` under `name` in its own process group.
    ///
    /// If a process with the same name is already running, no new child is
    /// spawned and the running record is returned with `duplicate` set.
    pub fn start(
        &self,
        name: &str,
        command: &str,
        cwd: PathBuf,
    ) -> Result<StartOutcome, SupervisorError> {
        if let Some(running) = self.find_running(name) {
            debug!(name, id = %running.id, "script already running");
            return Ok(StartOutcome { record: running, duplicate: true });
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let id = ProcessId::new(name, seq);
        let command = expand_vars(command, &self.inner.extra_env);
        let record = ProcessRecord::new(id.clone(), name, &command, cwd.clone());

        let (status_tx, status_rx) = watch::channel(ProcessStatus::Pending);
        let handle = Arc::new(ProcessHandle {
            record: Mutex::new(record),
            status_tx,
            status_rx,
            stop_requested: AtomicBool::new(false),
            pgid: Mutex::new(None),
        });
        self.inner.registry.write().insert(id.clone(), Arc::clone(&handle));

        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        for (k, v) in &self.inner.extra_env {
            cmd.env(k, v);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                // Keep the record queryable: pending → failed.
                set_status(&self.inner, &handle, ProcessStatus::Failed, None);
                return Err(SupervisorError::Spawn { name: name.to_string(), source });
            }
        };

        let pid = child.id();
        {
            let mut record = handle.record.lock();
            record.pid = pid;
            record.status = ProcessStatus::Running;
        }
        *handle.pgid.lock() = pid.map(|p| p as i32);
        let _ = handle.status_tx.send(ProcessStatus::Running);

        let snapshot = handle.record.lock().clone();
        info!(id = %snapshot.id, pid = ?pid, %command, "process started");
        self.inner.bus.publish(Event::ProcessStarted {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            command: snapshot.command.clone(),
            cwd: snapshot.cwd.clone(),
            pid,
        });

        // Stream readers own the pipes; the reaper owns the child.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        if let Some(out) = stdout {
            tokio::spawn(read_stream(Arc::clone(&self.inner), Arc::clone(&handle), out, false));
        }
        if let Some(err) = stderr {
            tokio::spawn(read_stream(Arc::clone(&self.inner), Arc::clone(&handle), err, true));
        }
        tokio::spawn(reap(Arc::clone(&self.inner), Arc::clone(&handle), child));

        Ok(StartOutcome { record: snapshot, duplicate: false })
    }

    /// Stop a process: SIGINT to its group, grace period, then SIGKILL.
    /// Resolves once the reaper has published `process:exited`.
    pub async fn stop(&self, id: &ProcessId) -> Result<ProcessRecord, SupervisorError> {
        let handle = self.get_handle(id)?;
        if handle.status_rx.borrow().is_terminal() {
            return Ok(handle.record.lock().clone());
        }
        handle.stop_requested.store(true, Ordering::Relaxed);

        let pgid = *handle.pgid.lock();
        if let Some(pgid) = pgid {
            signal_group(pgid, Signal::SIGINT);
        }

        let mut rx = handle.status_rx.clone();
        let graceful = tokio::time::timeout(self.inner.stop_grace, async {
            while !rx.borrow_and_update().is_terminal() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok();

        if !graceful {
            warn!(id = %id, "grace period expired, sending SIGKILL");
            if let Some(pgid) = pgid {
                signal_group(pgid, Signal::SIGKILL);
            }
            let mut rx = handle.status_rx.clone();
            while !rx.borrow_and_update().is_terminal() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let record = handle.record.lock().clone();
        Ok(record)
    }

    /// Stop, then start the same script once `process:exited` was observed.
    pub async fn restart(&self, id: &ProcessId) -> Result<StartOutcome, SupervisorError> {
        let (name, command, cwd) = {
            let handle = self.get_handle(id)?;
            let record = handle.record.lock();
            (record.name.clone(), record.command.clone(), record.cwd.clone())
        };
        self.stop(id).await?;
        self.start(&name, &command, cwd)
    }

    /// Stop all running processes concurrently; resolves when every reaper
    /// has finished.
    pub async fn stop_all(&self) {
        let ids: Vec<ProcessId> = {
            let registry = self.inner.registry.read();
            registry
                .iter()
                .filter(|(_, h)| !h.status_rx.borrow().is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };
        let stops = ids.iter().map(|id| self.stop(id));
        for result in futures_util::future::join_all(stops).await {
            if let Err(e) = result {
                warn!(error = %e, "stop_all entry failed");
            }
        }
    }

    pub fn get(&self, id: &ProcessId) -> Option<ProcessRecord> {
        self.inner.registry.read().get(id).map(|h| h.record.lock().clone())
    }

    /// Snapshot of every record, newest first.
    pub fn list(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> =
            self.inner.registry.read().values().map(|h| h.record.lock().clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    /// Watch a process's status without polling.
    pub fn watch_status(&self, id: &ProcessId) -> Option<watch::Receiver<ProcessStatus>> {
        self.inner.registry.read().get(id).map(|h| h.status_rx.clone())
    }

    fn find_running(&self, name: &str) -> Option<ProcessRecord> {
        let registry = self.inner.registry.read();
        registry.values().find_map(|h| {
            let record = h.record.lock();
            (record.name == name && !record.status.is_terminal()).then(|| record.clone())
        })
    }

    fn get_handle(&self, id: &ProcessId) -> Result<Arc<ProcessHandle>, SupervisorError> {
        self.inner
            .registry
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(id.clone()))
    }
}

fn signal_group(pgid: i32, signal: Signal) {
    if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
        debug!(pgid, ?signal, error = %e, "killpg failed");
    }
}

/// Transition a record, publish `process:exited` for terminal transitions.
fn set_status(inner: &Inner, handle: &ProcessHandle, status: ProcessStatus, code: Option<i32>) {
    let event = {
        let mut record = handle.record.lock();
        if !record.status.can_transition_to(status) {
            return;
        }
        record.status = status;
        if status.is_terminal() {
            record.exited_at = Some(chrono::Utc::now());
            record.exit_code = code;
            Some(Event::ProcessExited {
                id: record.id.clone(),
                name: record.name.clone(),
                status,
                exit_code: code,
                runtime_ms: record.runtime_ms(),
            })
        } else {
            None
        }
    };
    // Publish before waking watch waiters: anyone resuming on the status
    // change must already be able to observe `process:exited` on the bus.
    if let Some(event) = event {
        inner.bus.publish(event);
    }
    let _ = handle.status_tx.send(status);
}

/// Forward one pipe line-by-line into the sink and the bus.
async fn read_stream<R>(inner: Arc<Inner>, handle: Arc<ProcessHandle>, mut pipe: R, is_error: bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let (id, name) = {
        let record = handle.record.lock();
        (record.id.clone(), record.name.clone())
    };
    let mut splitter = LineSplitter::new(inner.max_line_bytes);
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    emit_line(&inner, &id, &name, &line, is_error);
                }
            }
            Err(e) => {
                // Stream errors do not kill the child; record and move on.
                warn!(id = %id, error = %e, "stream read failed");
                emit_line(&inner, &id, &name, &format!("[stream error: {e}]"), true);
                break;
            }
        }
    }
    if let Some(rest) = splitter.flush() {
        emit_line(&inner, &id, &name, &rest, is_error);
    }
}

fn emit_line(inner: &Inner, id: &ProcessId, name: &str, line: &str, is_error: bool) {
    (inner.sink)(id, name, line, is_error);
    inner.bus.publish(Event::LogLine {
        process_id: id.clone(),
        process_name: name.to_string(),
        text: line.to_string(),
        is_error,
    });
}

/// Wait for the child and post the terminal status.
async fn reap(inner: Arc<Inner>, handle: Arc<ProcessHandle>, mut child: tokio::process::Child) {
    match child.wait().await {
        Ok(status) => {
            let code = status.code();
            let stopped = handle.stop_requested.load(Ordering::Relaxed);
            let next = if stopped {
                ProcessStatus::Stopped
            } else if code == Some(0) {
                ProcessStatus::Success
            } else {
                ProcessStatus::Failed
            };
            set_status(&inner, &handle, next, code);
        }
        Err(e) => {
            warn!(error = %e, "reaper wait failed");
            set_status(&inner, &handle, ProcessStatus::Failed, None);
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
