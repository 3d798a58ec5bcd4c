//! The host role seen from outside.
//!
//! Callers that only need to drive a hosted session (the role manager, a
//! UI) go through [`HostAuthority`] instead of the concrete engine, so the
//! engine can be replaced without touching them.

use crate::error::Result;
use crate::server::{HostEngine, HostMetrics};
use async_trait::async_trait;
use sync_core::Reducer;
use sync_types::{Action, FullState, PeerRole};

/// Authority over a hosted session's state and connections.
#[async_trait]
pub trait HostAuthority: Send + Sync {
    /// Apply a locally dispatched action and relay it to every director.
    async fn dispatch(&self, action: Action) -> Result<()>;

    /// Replace the authoritative state and push it to every peer.
    async fn load_state(&self, state: FullState) -> Result<()>;

    /// Push the current state to every peer again.
    async fn resync(&self) -> Result<()>;

    /// Number of connected peers of `role`.
    fn connections(&self, role: PeerRole) -> usize;

    /// Operational counters.
    fn metrics(&self) -> &HostMetrics;

    /// Close every connection. Calling it twice is a no-op.
    async fn shutdown(&self);
}

#[async_trait]
impl<R: Reducer> HostAuthority for HostEngine<R> {
    async fn dispatch(&self, action: Action) -> Result<()> {
        HostEngine::dispatch(self, action).await
    }

    async fn load_state(&self, state: FullState) -> Result<()> {
        HostEngine::load_state(self, state).await
    }

    async fn resync(&self) -> Result<()> {
        HostEngine::resync(self).await
    }

    fn connections(&self, role: PeerRole) -> usize {
        self.registry().count(role)
    }

    fn metrics(&self) -> &HostMetrics {
        HostEngine::metrics(self)
    }

    async fn shutdown(&self) {
        HostEngine::shutdown(self).await
    }
}
