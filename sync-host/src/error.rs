//! Error types for sync-host.

use sync_client::{ClientError, TransportError};
use sync_types::{PeerRole, SyncError};

/// Main error type for host and role operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Director-side error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] SyncError),

    /// Connection refused because the role's limit is reached.
    #[error("{role} capacity reached (limit: {limit})")]
    CapacityReached {
        /// Role of the refused connection.
        role: PeerRole,
        /// Configured limit.
        limit: usize,
    },

    /// Retry requested but no session was ever created or joined.
    #[error("no session to retry")]
    NoSession,

    /// Operation not available in the current role.
    #[error("operation requires the {expected} role")]
    WrongRole {
        /// Role the operation needs.
        expected: &'static str,
    },

    /// The host engine has been shut down.
    #[error("host has shut down")]
    ShutDown,
}

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
