//! Client error types.

use crate::transport::TransportError;
use sync_types::SyncError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding or decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] SyncError),

    /// Not connected to a host.
    #[error("not connected")]
    NotConnected,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
