//! Transport abstraction for floor-sync.
//!
//! Peer discovery and the byte stream itself belong to an external
//! signaling service. This module only describes what the replication
//! engines need from it:
//!
//! - [`Signaling::listen`] binds a session id and yields a [`Listener`]
//!   (host side)
//! - [`Signaling::connect`] opens a [`Channel`] to whoever listens on a
//!   session id (director and public-viewer side)
//! - [`Channel`] is a reliable, ordered, bidirectional stream of UTF-8
//!   text frames with an open/close lifecycle
//!
//! [`MemorySignaling`] implements all of this in-process for tests and
//! demos.
//!
//! # Example
//!
//! ```ignore
//! let signaling = MemorySignaling::new();
//! let listener = signaling.listen(&session).await?;
//! let channel = signaling.connect(&session, None).await?;
//! if let Some(incoming) = listener.accept().await? {
//!     channel.send(r#"{"type":"ACTION","payload":{}}"#).await?;
//!     assert_eq!(incoming.channel.recv().await?.as_deref(), Some(r#"{"type":"ACTION","payload":{}}"#));
//! }
//! ```

mod memory;

pub use memory::{MemoryChannel, MemorySignaling};

use async_trait::async_trait;
use std::sync::Arc;
use sync_types::{ConnectMetadata, PeerId, SessionId};
use thiserror::Error;

/// Default upper bound for one inbound frame (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Binding a listener failed.
    #[error("listen failed: {0}")]
    ListenFailed(String),

    /// Another listener already holds the session id.
    #[error("session {0} is already bound")]
    SessionInUse(SessionId),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// One end of an established connection.
///
/// Frames are delivered reliably and in order. Closing either end closes
/// both.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send one text frame.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` once the channel is closed.
    async fn recv(&self) -> Result<Option<String>, TransportError>;

    /// Check if the channel is still open.
    fn is_open(&self) -> bool;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&self);
}

/// A connection accepted by a [`Listener`].
pub struct Incoming {
    /// Transport-assigned id of the remote end.
    pub remote_id: PeerId,
    /// Metadata the remote declared at connect time.
    pub metadata: Option<ConnectMetadata>,
    /// The host-side end of the connection.
    pub channel: Arc<dyn Channel>,
}

impl std::fmt::Debug for Incoming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Incoming")
            .field("remote_id", &self.remote_id)
            .field("metadata", &self.metadata)
            .field("open", &self.channel.is_open())
            .finish()
    }
}

/// A bound session id accepting connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Wait for the next connection.
    ///
    /// Returns `Ok(None)` once the listener is closed.
    async fn accept(&self) -> Result<Option<Incoming>, TransportError>;

    /// Stop accepting and release the session id. Closing twice is a no-op.
    async fn close(&self);
}

/// Rendezvous service that pairs endpoints agreeing on a session id.
#[async_trait]
pub trait Signaling: Send + Sync + 'static {
    /// Bind `session` and accept connections on it.
    async fn listen(&self, session: &SessionId) -> Result<Box<dyn Listener>, TransportError>;

    /// Connect to the listener bound to `session`.
    async fn connect(
        &self,
        session: &SessionId,
        metadata: Option<ConnectMetadata>,
    ) -> Result<Arc<dyn Channel>, TransportError>;
}
