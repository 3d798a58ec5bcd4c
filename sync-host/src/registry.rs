//! Connection registry.
//!
//! The host keeps directors and public viewers in two separate maps; the
//! two classes never see each other's traffic. Each [`PeerConnection`] owns
//! an outbox drained by its own writer task, so a broadcast only enqueues
//! and never waits on a slow peer.

use crate::server::HostMetrics;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync_client::Channel;
use sync_types::{PeerId, PeerRole};
use tokio::sync::mpsc;

/// One accepted connection.
pub struct PeerConnection {
    remote_id: PeerId,
    role: PeerRole,
    channel: Arc<dyn Channel>,
    outbox: mpsc::UnboundedSender<String>,
    open: AtomicBool,
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("remote_id", &self.remote_id)
            .field("role", &self.role)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl PeerConnection {
    /// Wrap `channel` and start its writer task.
    pub fn spawn(
        remote_id: PeerId,
        role: PeerRole,
        channel: Arc<dyn Channel>,
        metrics: Arc<HostMetrics>,
    ) -> Arc<Self> {
        let (outbox, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(remote_id, Arc::clone(&channel), rx, metrics));

        Arc::new(Self {
            remote_id,
            role,
            channel,
            outbox,
            open: AtomicBool::new(true),
        })
    }

    /// Transport-assigned id of the remote end.
    pub fn remote_id(&self) -> PeerId {
        self.remote_id
    }

    /// Class of this connection.
    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// The underlying channel.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Check if the connection can still take frames.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.channel.is_open()
    }

    /// Queue a frame for delivery. Returns false if the peer is gone.
    pub fn enqueue(&self, text: String) -> bool {
        self.is_open() && self.outbox.send(text).is_ok()
    }

    /// Close the connection. Only the first call closes the channel.
    pub async fn close(&self) -> bool {
        if self.open.swap(false, Ordering::AcqRel) {
            self.channel.close().await;
            true
        } else {
            false
        }
    }
}

async fn write_loop(
    remote_id: PeerId,
    channel: Arc<dyn Channel>,
    mut rx: mpsc::UnboundedReceiver<String>,
    metrics: Arc<HostMetrics>,
) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = channel.send(&text).await {
            tracing::warn!("Send to {} failed, dropping peer: {}", remote_id, e);
            metrics.send_failures.fetch_add(1, Ordering::Relaxed);
            // the peer's reader sees the close and unregisters it
            channel.close().await;
            return;
        }
    }
}

/// Directors and public viewers currently connected to the host.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    directors: DashMap<PeerId, Arc<PeerConnection>>,
    viewers: DashMap<PeerId, Arc<PeerConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, role: PeerRole) -> &DashMap<PeerId, Arc<PeerConnection>> {
        match role {
            PeerRole::Director => &self.directors,
            PeerRole::PublicViewer => &self.viewers,
        }
    }

    /// Track `peer` under its role.
    pub fn register(&self, peer: Arc<PeerConnection>) {
        let (id, role) = (peer.remote_id(), peer.role());
        let map = self.map(role);
        map.insert(id, peer);
        tracing::debug!("Registered {} {} ({} total)", role, id, map.len());
    }

    /// Stop tracking a peer, whichever map held it.
    pub fn remove(&self, id: &PeerId) -> Option<Arc<PeerConnection>> {
        self.directors
            .remove(id)
            .or_else(|| self.viewers.remove(id))
            .map(|(_, peer)| peer)
    }

    /// Look up a tracked peer.
    pub fn get(&self, id: &PeerId) -> Option<Arc<PeerConnection>> {
        self.directors
            .get(id)
            .or_else(|| self.viewers.get(id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Queue `text` for every peer of `role` except `exclude`.
    ///
    /// Peers that can no longer take frames are removed. Returns how many
    /// peers the frame was queued for.
    pub fn broadcast(&self, role: PeerRole, text: &str, exclude: Option<&PeerId>) -> usize {
        let map = self.map(role);
        let mut queued = 0;
        let mut dead = Vec::new();

        for entry in map.iter() {
            if Some(entry.key()) == exclude {
                continue;
            }
            if entry.value().enqueue(text.to_string()) {
                queued += 1;
            } else {
                dead.push(*entry.key());
            }
        }

        // removing while iterating would deadlock the shard
        for id in &dead {
            map.remove(id);
            tracing::debug!("Dropped closed {} {}", role, id);
        }
        queued
    }

    /// Queue `text` for a single peer.
    pub fn send_to(&self, id: &PeerId, text: String) -> bool {
        self.get(id).is_some_and(|peer| peer.enqueue(text))
    }

    /// Number of tracked peers of `role`.
    pub fn count(&self, role: PeerRole) -> usize {
        self.map(role).len()
    }

    /// Total tracked peers.
    pub fn len(&self) -> usize {
        self.directors.len() + self.viewers.len()
    }

    /// Check if no peer is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every tracked peer.
    pub fn drain(&self) -> Vec<Arc<PeerConnection>> {
        let ids: Vec<PeerId> = self
            .directors
            .iter()
            .chain(self.viewers.iter())
            .map(|entry| *entry.key())
            .collect();

        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}
