//! Host replication engine.
//!
//! [`HostEngine`] owns the authoritative replica of a hosted session and
//! the registry of everyone connected to it. Every state change happens
//! under the replica lock together with the frames it causes, so all
//! directors see actions in the order the host applied them and viewers
//! never receive an older projection after a newer one.

use crate::config::HostLimits;
use crate::error::{HostError, Result};
use crate::registry::{ConnectionRegistry, PeerConnection};
use crate::session::PeerSession;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use sync_client::{Incoming, SharedReplica};
use sync_core::{to_public_state, Origin, Reducer, Replica};
use sync_types::{Action, FullState, PeerId, PeerRole, SyncError, SyncMessage};

/// Operational counters for a hosted session.
///
/// All counters are monotonically increasing.
/// Thread-safe via `AtomicU64`; no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct HostMetrics {
    /// Connections registered.
    pub connections_accepted: AtomicU64,
    /// Connections closed on accept (capacity or shutdown).
    pub connections_rejected: AtomicU64,
    /// Actions applied to the authoritative state.
    pub actions_applied: AtomicU64,
    /// ACTION frames queued to directors.
    pub actions_relayed: AtomicU64,
    /// FULL_STATE_SYNC frames queued to directors.
    pub snapshots_pushed: AtomicU64,
    /// Projection frames queued to public viewers.
    pub projections_pushed: AtomicU64,
    /// Inbound frames dropped as malformed or oversize.
    pub malformed_frames: AtomicU64,
    /// Sends that failed and dropped their peer.
    pub send_failures: AtomicU64,
}

impl HostMetrics {
    fn bump(counter: &AtomicU64, by: usize) {
        counter.fetch_add(by as u64, Ordering::Relaxed);
    }
}

/// Authority over one hosted session.
pub struct HostEngine<R> {
    replica: SharedReplica<R>,
    registry: ConnectionRegistry,
    limits: HostLimits,
    metrics: Arc<HostMetrics>,
    closed: AtomicBool,
}

impl<R> std::fmt::Debug for HostEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEngine")
            .field("limits", &self.limits)
            .field("metrics", &self.metrics)
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl<R: Reducer> HostEngine<R> {
    /// Create an engine that owns `replica` as the authoritative state.
    pub fn new(replica: SharedReplica<R>, limits: HostLimits) -> Self {
        Self {
            replica,
            registry: ConnectionRegistry::new(),
            limits,
            metrics: Arc::new(HostMetrics::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the host limits.
    pub fn limits(&self) -> &HostLimits {
        &self.limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &HostMetrics {
        &self.metrics
    }

    /// Get access to the connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The authoritative replica.
    pub fn replica(&self) -> &SharedReplica<R> {
        &self.replica
    }

    /// Check if [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Register an accepted connection and push its initial state.
    ///
    /// Directors get one `FULL_STATE_SYNC`, public viewers one bare
    /// projection. The peer is registered under the replica lock, so it
    /// sees every action applied after its snapshot and none before.
    pub async fn accept(self: &Arc<Self>, incoming: Incoming) -> Result<PeerId> {
        let role = PeerRole::from_metadata(incoming.metadata.as_ref());
        let remote_id = incoming.remote_id;

        if self.is_shut_down() {
            HostMetrics::bump(&self.metrics.connections_rejected, 1);
            incoming.channel.close().await;
            return Err(HostError::ShutDown);
        }

        let limit = match role {
            PeerRole::Director => self.limits.max_directors,
            PeerRole::PublicViewer => self.limits.max_viewers,
        };
        if self.registry.count(role) >= limit {
            tracing::warn!("{} limit reached ({}), rejecting {}", role, limit, remote_id);
            HostMetrics::bump(&self.metrics.connections_rejected, 1);
            incoming.channel.close().await;
            return Err(HostError::CapacityReached { role, limit });
        }

        let peer = PeerConnection::spawn(
            remote_id,
            role,
            incoming.channel,
            Arc::clone(&self.metrics),
        );

        let registered = self
            .replica
            .with(|r| -> std::result::Result<bool, SyncError> {
                // shutdown drains under this same lock
                if self.is_shut_down() {
                    return Ok(false);
                }
                let initial = match role {
                    PeerRole::Director => {
                        HostMetrics::bump(&self.metrics.snapshots_pushed, 1);
                        SyncMessage::full_state_sync(r.state()).to_json()?
                    }
                    PeerRole::PublicViewer => {
                        HostMetrics::bump(&self.metrics.projections_pushed, 1);
                        to_public_state(r.state()).to_json()?
                    }
                };
                self.registry.register(Arc::clone(&peer));
                peer.enqueue(initial);
                Ok(true)
            })
            .await;

        match registered {
            Ok(true) => {}
            Ok(false) => {
                HostMetrics::bump(&self.metrics.connections_rejected, 1);
                peer.close().await;
                return Err(HostError::ShutDown);
            }
            Err(e) => {
                peer.close().await;
                return Err(e.into());
            }
        }

        HostMetrics::bump(&self.metrics.connections_accepted, 1);
        tracing::info!("Accepted {} {}", role, remote_id);

        tokio::spawn(PeerSession::new(Arc::clone(self), peer).run());
        Ok(remote_id)
    }

    /// Apply a locally dispatched action and relay it to every director.
    pub async fn dispatch(&self, action: Action) -> Result<()> {
        self.apply(action, None).await
    }

    /// Apply an action and relay it to every director except `sender`.
    pub(crate) async fn apply(&self, action: Action, sender: Option<PeerId>) -> Result<()> {
        let text = SyncMessage::Action(action.clone()).to_json()?;
        let origin = if sender.is_some() {
            Origin::Sync
        } else {
            Origin::Local
        };

        self.replica
            .with(|r| {
                r.apply(&action, origin);
                HostMetrics::bump(&self.metrics.actions_applied, 1);

                let relayed = self
                    .registry
                    .broadcast(PeerRole::Director, &text, sender.as_ref());
                HostMetrics::bump(&self.metrics.actions_relayed, relayed);
                tracing::debug!(
                    "Applied {} and relayed to {} director(s)",
                    action.kind().unwrap_or("action"),
                    relayed
                );

                self.push_projection(r)
            })
            .await
    }

    /// Replace the authoritative state and push it to everyone.
    pub async fn load_state(&self, state: FullState) -> Result<()> {
        self.replica
            .with(|r| {
                r.replace(state);
                self.push_snapshot(r)?;
                self.push_projection(r)
            })
            .await
    }

    /// Push the current snapshot to every director and projection to every
    /// viewer.
    pub async fn resync(&self) -> Result<()> {
        self.replica
            .with(|r| {
                self.push_snapshot(r)?;
                self.push_projection(r)
            })
            .await
    }

    fn push_snapshot(&self, replica: &Replica<R>) -> Result<()> {
        if self.registry.count(PeerRole::Director) == 0 {
            return Ok(());
        }
        let text = SyncMessage::full_state_sync(replica.state()).to_json()?;
        let pushed = self.registry.broadcast(PeerRole::Director, &text, None);
        HostMetrics::bump(&self.metrics.snapshots_pushed, pushed);
        Ok(())
    }

    fn push_projection(&self, replica: &Replica<R>) -> Result<()> {
        if self.registry.count(PeerRole::PublicViewer) == 0 {
            return Ok(());
        }
        let text = to_public_state(replica.state()).to_json()?;
        let pushed = self.registry.broadcast(PeerRole::PublicViewer, &text, None);
        HostMetrics::bump(&self.metrics.projections_pushed, pushed);
        Ok(())
    }

    /// Handle one inbound frame from a director.
    pub(crate) async fn on_director_frame(&self, sender: PeerId, frame: &str) {
        match SyncMessage::from_json_limited(frame, self.limits.max_message_bytes) {
            Ok(SyncMessage::Action(action)) => {
                if let Err(e) = self.apply(action, Some(sender)).await {
                    tracing::warn!("Failed to relay action from {}: {}", sender, e);
                }
            }
            Ok(other) => {
                tracing::warn!("Ignoring {} from director {}", other.type_name(), sender);
                HostMetrics::bump(&self.metrics.malformed_frames, 1);
            }
            Err(e) => {
                tracing::warn!("Dropping malformed frame from {}: {}", sender, e);
                HostMetrics::bump(&self.metrics.malformed_frames, 1);
            }
        }
    }

    /// Forget a peer whose connection ended.
    pub(crate) async fn disconnect(&self, id: &PeerId) {
        if let Some(peer) = self.registry.remove(id) {
            peer.close().await;
            tracing::info!("{} {} disconnected", peer.role(), id);
        }
    }

    /// Close every tracked connection exactly once. Calling it twice is a
    /// no-op.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let peers = self.replica.with(|_| self.registry.drain()).await;
        let count = peers.len();
        for peer in peers {
            peer.close().await;
        }
        tracing::info!("Host shut down, closed {} connection(s)", count);
    }
}
