//! Per-connection session management.
//!
//! Each accepted connection gets a [`PeerSession`] that reads its inbound
//! frames until the channel ends, then unregisters it.

use crate::registry::PeerConnection;
use crate::server::HostEngine;
use std::sync::Arc;
use sync_core::Reducer;
use sync_types::PeerRole;

/// Reader side of one accepted connection.
pub struct PeerSession<R> {
    engine: Arc<HostEngine<R>>,
    peer: Arc<PeerConnection>,
}

impl<R: Reducer> PeerSession<R> {
    /// Create a new session for a registered peer.
    pub fn new(engine: Arc<HostEngine<R>>, peer: Arc<PeerConnection>) -> Self {
        Self { engine, peer }
    }

    /// Run the session until the connection ends.
    pub async fn run(self) {
        let remote_id = self.peer.remote_id();

        loop {
            let frame = match self.peer.channel().recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::debug!("Connection closed: {}", remote_id);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Connection error from {}: {}", remote_id, e);
                    break;
                }
            };

            match self.peer.role() {
                PeerRole::Director => self.engine.on_director_frame(remote_id, &frame).await,
                // viewers are push-only sinks
                PeerRole::PublicViewer => {
                    tracing::debug!("Ignoring {} byte frame from viewer {}", frame.len(), remote_id);
                }
            }
        }

        self.engine.disconnect(&remote_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostLimits;
    use std::sync::atomic::Ordering;
    use sync_client::{Channel, Incoming, MemoryChannel, SharedReplica};
    use sync_types::{Action, ConnectMetadata, FullState, PeerId, SyncMessage};

    type Noop = fn(FullState, &Action) -> FullState;

    fn noop(state: FullState, _: &Action) -> FullState {
        state
    }

    fn engine() -> Arc<HostEngine<Noop>> {
        Arc::new(HostEngine::new(
            SharedReplica::new(FullState::default(), noop as Noop),
            HostLimits::default(),
        ))
    }

    async fn connect(engine: &Arc<HostEngine<Noop>>, metadata: Option<ConnectMetadata>) -> MemoryChannel {
        let (host_end, remote_end) = MemoryChannel::pair();
        engine
            .accept(Incoming {
                remote_id: PeerId::new(),
                metadata,
                channel: Arc::new(host_end),
            })
            .await
            .unwrap();
        // initial push
        remote_end.recv().await.unwrap();
        remote_end
    }

    async fn wait_until_empty(engine: &HostEngine<Noop>, role: PeerRole) {
        while engine.registry().count(role) > 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn closed_connection_is_unregistered() {
        let engine = engine();
        let director = connect(&engine, None).await;
        let _other = connect(&engine, None).await;

        director.close().await;
        while engine.registry().count(PeerRole::Director) > 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.registry().count(PeerRole::Director), 1);
    }

    #[tokio::test]
    async fn viewer_frames_are_ignored() {
        let engine = engine();
        let viewer = connect(&engine, Some(ConnectMetadata::public_viewer())).await;

        let frame = SyncMessage::Action(Action::new("NEXT_LEVEL", serde_json::json!({})));
        viewer.send(&frame.to_json().unwrap()).await.unwrap();
        viewer.close().await;
        wait_until_empty(&engine, PeerRole::PublicViewer).await;

        assert_eq!(engine.metrics().actions_applied.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn director_frames_reach_the_engine() {
        let engine = engine();
        let director = connect(&engine, None).await;

        let frame = SyncMessage::Action(Action::new("PAUSE", serde_json::json!({})));
        director.send(&frame.to_json().unwrap()).await.unwrap();
        director.close().await;
        wait_until_empty(&engine, PeerRole::Director).await;

        assert_eq!(engine.metrics().actions_applied.load(Ordering::Relaxed), 1);
    }
}
