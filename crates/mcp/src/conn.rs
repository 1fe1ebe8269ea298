// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer connection manager
//!
//! All peer and session-binding state lives in one owner task; other
//! components submit typed commands and await replies. No shared mutexes.
//!
//! Per-peer state machine:
//! `discovered → connecting → active`, failures go through `retrying` with
//! exponential backoff (1s base, ×2, 30s cap) until the retry budget is
//! exhausted and the peer is `dead`. A re-appearance in discovery resets a
//! dead peer.

use crate::client::{ClientError, PeerClient};
use crate::registry::McpError;
use brum_core::{ErrorKind, InstanceDescriptor};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
/// Transition history kept per peer for operator visibility.
const HISTORY_LIMIT: usize = 50;

/// Produces a connected client for a descriptor (injectable for tests).
pub type Connector = Arc<
    dyn Fn(InstanceDescriptor) -> BoxFuture<'static, Result<Arc<dyn PeerClient>, ClientError>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Discovered,
    Connecting,
    Active,
    Retrying,
    Dead,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from: PeerState,
    pub to: PeerState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Read-only view of one peer, as returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSnapshot {
    pub descriptor: InstanceDescriptor,
    pub state: PeerState,
    pub retries: u32,
    /// Live client handle attached (true iff state is `active`).
    pub has_client: bool,
    pub sessions: Vec<String>,
    pub discovered_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

struct Peer {
    descriptor: InstanceDescriptor,
    state: PeerState,
    retries: u32,
    client: Option<Arc<dyn PeerClient>>,
    discovered_at: DateTime<Utc>,
    state_changed_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
    history: Vec<Transition>,
}

impl Peer {
    fn new(descriptor: InstanceDescriptor) -> Self {
        let now = Utc::now();
        Self {
            descriptor,
            state: PeerState::Discovered,
            retries: 0,
            client: None,
            discovered_at: now,
            state_changed_at: now,
            connected_at: None,
            last_activity: None,
            history: Vec::new(),
        }
    }

    fn transition(&mut self, to: PeerState, reason: &str) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.state_changed_at = Utc::now();
        self.history.push(Transition {
            from,
            to,
            reason: reason.to_string(),
            at: self.state_changed_at,
        });
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
        debug!(id = %self.descriptor.id, ?from, ?to, reason, "peer transition");
    }

    fn snapshot(&self, sessions: &HashMap<String, String>) -> PeerSnapshot {
        PeerSnapshot {
            descriptor: self.descriptor.clone(),
            state: self.state,
            retries: self.retries,
            has_client: self.client.is_some(),
            sessions: sessions
                .iter()
                .filter(|(_, iid)| **iid == self.descriptor.id)
                .map(|(sid, _)| sid.clone())
                .collect(),
            discovered_at: self.discovered_at,
            state_changed_at: self.state_changed_at,
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

enum Command {
    Appeared(InstanceDescriptor),
    Lost(String),
    TryConnect(String),
    ConnectOutcome(String, Result<Arc<dyn PeerClient>, ClientError>),
    ConnectSession {
        session_id: String,
        instance_id: String,
        reply: oneshot::Sender<Result<(), McpError>>,
    },
    DisconnectSession {
        session_id: String,
        reply: oneshot::Sender<()>,
    },
    ClientForSession {
        session_id: String,
        reply: oneshot::Sender<Option<(String, Arc<dyn PeerClient>)>>,
    },
    List {
        reply: oneshot::Sender<Vec<PeerSnapshot>>,
    },
    ActiveClients {
        reply: oneshot::Sender<Vec<(String, Arc<dyn PeerClient>)>>,
    },
    MarkUnhealthy {
        instance_id: String,
        reason: String,
    },
    Activity(String),
}

/// Cloneable handle to the owner task.
#[derive(Clone)]
pub struct ConnectionManager {
    tx: mpsc::Sender<Command>,
}

impl ConnectionManager {
    /// Spawn the owner task.
    pub fn start(connector: Connector, max_retries: u32, cancel: &CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let owner = Owner {
            connector,
            max_retries,
            peers: HashMap::new(),
            sessions: HashMap::new(),
            tx: tx.clone(),
        };
        let cancel = cancel.child_token();
        tokio::spawn(owner.run(rx, cancel));
        Self { tx }
    }

    pub async fn instance_appeared(&self, descriptor: InstanceDescriptor) {
        let _ = self.tx.send(Command::Appeared(descriptor)).await;
    }

    pub async fn instance_lost(&self, id: String) {
        let _ = self.tx.send(Command::Lost(id)).await;
    }

    /// Bind a session to an `active` peer; replaces any previous binding.
    pub async fn connect_session(
        &self,
        session_id: &str,
        instance_id: &str,
    ) -> Result<(), McpError> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::ConnectSession {
                session_id: session_id.to_string(),
                instance_id: instance_id.to_string(),
                reply,
            })
            .await;
        rx.await
            .map_err(|_| McpError::internal("connection manager gone"))?
    }

    /// Idempotent unbind.
    pub async fn disconnect_session(&self, session_id: &str) {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::DisconnectSession { session_id: session_id.to_string(), reply })
            .await;
        let _ = rx.await;
    }

    /// The bound peer's id and live client, if the binding is active.
    pub async fn client_for_session(
        &self,
        session_id: &str,
    ) -> Option<(String, Arc<dyn PeerClient>)> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::ClientForSession { session_id: session_id.to_string(), reply })
            .await;
        rx.await.ok().flatten()
    }

    pub async fn list(&self) -> Vec<PeerSnapshot> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::List { reply }).await;
        rx.await.unwrap_or_default()
    }

    /// Active peers with their clients, for the health monitor.
    pub async fn active_clients(&self) -> Vec<(String, Arc<dyn PeerClient>)> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::ActiveClients { reply }).await;
        rx.await.unwrap_or_default()
    }

    /// Health monitor verdict: the peer stopped answering pings.
    pub async fn mark_unhealthy(&self, instance_id: &str, reason: &str) {
        let _ = self
            .tx
            .send(Command::MarkUnhealthy {
                instance_id: instance_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
    }

    /// Successful ping or tool call on this peer.
    pub async fn record_activity(&self, instance_id: &str) {
        let _ = self.tx.send(Command::Activity(instance_id.to_string())).await;
    }
}

struct Owner {
    connector: Connector,
    max_retries: u32,
    peers: HashMap<String, Peer>,
    /// session id → instance id
    sessions: HashMap<String, String>,
    tx: mpsc::Sender<Command>,
}

impl Owner {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.handle(command);
        }
        // Shutdown: close every live client.
        for peer in self.peers.values_mut() {
            if let Some(client) = peer.client.take() {
                tokio::spawn(async move { client.close().await });
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Appeared(descriptor) => self.on_appeared(descriptor),
            Command::Lost(id) => self.on_lost(&id),
            Command::TryConnect(id) => self.start_connect(&id),
            Command::ConnectOutcome(id, outcome) => self.on_connect_outcome(&id, outcome),
            Command::ConnectSession { session_id, instance_id, reply } => {
                let _ = reply.send(self.bind_session(session_id, &instance_id));
            }
            Command::DisconnectSession { session_id, reply } => {
                self.sessions.remove(&session_id);
                let _ = reply.send(());
            }
            Command::ClientForSession { session_id, reply } => {
                let result = self.sessions.get(&session_id).and_then(|iid| {
                    self.peers
                        .get(iid)
                        .filter(|p| p.state == PeerState::Active)
                        .and_then(|p| p.client.clone().map(|c| (iid.clone(), c)))
                });
                let _ = reply.send(result);
            }
            Command::List { reply } => {
                let mut snapshots: Vec<PeerSnapshot> =
                    self.peers.values().map(|p| p.snapshot(&self.sessions)).collect();
                snapshots.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
                let _ = reply.send(snapshots);
            }
            Command::ActiveClients { reply } => {
                let clients = self
                    .peers
                    .values()
                    .filter(|p| p.state == PeerState::Active)
                    .filter_map(|p| p.client.clone().map(|c| (p.descriptor.id.clone(), c)))
                    .collect();
                let _ = reply.send(clients);
            }
            Command::MarkUnhealthy { instance_id, reason } => {
                self.demote(&instance_id, &reason);
            }
            Command::Activity(id) => {
                if let Some(peer) = self.peers.get_mut(&id) {
                    peer.last_activity = Some(Utc::now());
                }
            }
        }
    }

    fn on_appeared(&mut self, descriptor: InstanceDescriptor) {
        let id = descriptor.id.clone();
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.descriptor = descriptor;
                if peer.state == PeerState::Dead {
                    // Re-appearance resets a dead peer.
                    peer.retries = 0;
                    peer.transition(PeerState::Discovered, "rediscovered");
                    self.start_connect(&id);
                }
            }
            None => {
                self.peers.insert(id.clone(), Peer::new(descriptor));
                self.start_connect(&id);
            }
        }
    }

    fn on_lost(&mut self, id: &str) {
        self.unbind_peer_sessions(id);
        if let Some(mut peer) = self.peers.remove(id) {
            peer.transition(PeerState::Dead, "descriptor removed");
            if let Some(client) = peer.client.take() {
                tokio::spawn(async move { client.close().await });
            }
            info!(id, "peer removed");
        }
    }

    fn start_connect(&mut self, id: &str) {
        let Some(peer) = self.peers.get_mut(id) else { return };
        if matches!(peer.state, PeerState::Connecting | PeerState::Active) {
            return;
        }
        peer.transition(PeerState::Connecting, "connect scheduled");
        let descriptor = peer.descriptor.clone();
        let connector = Arc::clone(&self.connector);
        let tx = self.tx.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let outcome = connector(descriptor).await;
            let _ = tx.send(Command::ConnectOutcome(id, outcome)).await;
        });
    }

    fn on_connect_outcome(
        &mut self,
        id: &str,
        outcome: Result<Arc<dyn PeerClient>, ClientError>,
    ) {
        let Some(peer) = self.peers.get_mut(id) else { return };
        match outcome {
            Ok(client) => {
                peer.client = Some(client);
                peer.retries = 0;
                peer.connected_at = Some(Utc::now());
                peer.last_activity = Some(Utc::now());
                peer.transition(PeerState::Active, "handshake ok");
            }
            Err(e) => {
                peer.client = None;
                peer.retries += 1;
                if peer.retries >= self.max_retries {
                    peer.transition(PeerState::Dead, &format!("retries exhausted: {e}"));
                    let peer_id = id.to_string();
                    self.unbind_peer_sessions(&peer_id);
                    return;
                }
                peer.transition(PeerState::Retrying, &format!("connect failed: {e}"));
                let delay = backoff(peer.retries);
                let tx = self.tx.clone();
                let id = id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Command::TryConnect(id)).await;
                });
            }
        }
    }

    /// Take a peer out of `active`: unbind its sessions first so the next
    /// tool call on them fails, then retry from scratch.
    fn demote(&mut self, id: &str, reason: &str) {
        self.unbind_peer_sessions(id);
        let Some(peer) = self.peers.get_mut(id) else { return };
        if peer.state != PeerState::Active {
            return;
        }
        if let Some(client) = peer.client.take() {
            tokio::spawn(async move { client.close().await });
        }
        peer.transition(PeerState::Retrying, reason);
        warn!(id, reason, "peer demoted from active");
        let delay = backoff(peer.retries.max(1));
        let tx = self.tx.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::TryConnect(id)).await;
        });
    }

    fn bind_session(&mut self, session_id: String, instance_id: &str) -> Result<(), McpError> {
        match self.peers.get(instance_id) {
            Some(peer) if peer.state == PeerState::Active => {
                self.sessions.insert(session_id, instance_id.to_string());
                Ok(())
            }
            Some(peer) => Err(McpError::new(
                ErrorKind::PeerUnavailable,
                format!("instance {instance_id} is {:?}", peer.state),
            )),
            None => Err(McpError::not_found(format!("unknown instance: {instance_id}"))),
        }
    }

    fn unbind_peer_sessions(&mut self, instance_id: &str) {
        self.sessions.retain(|_, iid| iid != instance_id);
    }
}

fn backoff(retries: u32) -> Duration {
    let exp = retries.saturating_sub(1).min(10);
    let delay = BACKOFF_BASE * 2u32.saturating_pow(exp);
    delay.min(BACKOFF_CAP)
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
