//! Error types for floor-sync.

use thiserror::Error;

/// Errors that can occur while encoding or decoding floor-sync data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed (bad JSON or unknown message type)
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Frame exceeds the configured size limit
    #[error("message too large: {size} bytes (limit: {limit})")]
    MessageTooLarge {
        /// Actual frame size
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Session id is empty, too long or contains unsupported characters
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// The OS random source failed
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::InvalidSessionId("a b".into());
        assert_eq!(err.to_string(), "invalid session id: \"a b\"");

        let err = SyncError::MessageTooLarge { size: 10, limit: 4 };
        assert_eq!(err.to_string(), "message too large: 10 bytes (limit: 4)");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
