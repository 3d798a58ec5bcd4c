//! Identity types for floor-sync.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SyncError;

/// Length of a generated session id.
pub const SESSION_ID_LEN: usize = 8;

/// Longest session id accepted from the outside (links, QR payloads).
const MAX_SESSION_ID_LEN: usize = 64;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Opaque identifier of a replication session, chosen by the host.
///
/// Generated ids are 8 random alphanumeric characters. Uniqueness is
/// probabilistic only; two hosts picking the same id is an accepted risk.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Result<Self, SyncError> {
        let mut id = String::with_capacity(SESSION_ID_LEN);
        let mut bytes = [0u8; 32];

        while id.len() < SESSION_ID_LEN {
            getrandom::getrandom(&mut bytes).map_err(|e| SyncError::Entropy(e.to_string()))?;
            // only bytes below 248 (4 * 62) map uniformly onto the alphabet
            for b in bytes.iter().filter(|b| **b < 248) {
                if id.len() == SESSION_ID_LEN {
                    break;
                }
                id.push(ALPHABET[(*b % 62) as usize] as char);
            }
        }

        Ok(Self(id))
    }

    /// Validate an externally supplied session id.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(SyncError::InvalidSessionId(raw.to_string()))
        }
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::str::FromStr for SessionId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Identifier the transport assigns to one accepted connection.
///
/// UUID v4 format (16 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(uuid::Uuid);

impl PeerId {
    /// Create a new random PeerId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the raw bytes of this PeerId.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_session_id_is_eight_alphanumerics() {
        let id = SessionId::generate().unwrap();
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert!(id.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_session_ids_differ() {
        let ids: HashSet<_> = (0..50).map(|_| SessionId::generate().unwrap()).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn parse_accepts_generated_ids() {
        let id = SessionId::generate().unwrap();
        assert_eq!(SessionId::parse(id.as_str()).unwrap(), id);
        assert_eq!(SessionId::parse("ab12cd34").unwrap().as_str(), "ab12cd34");
    }

    #[test]
    fn parse_rejects_bad_ids() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("has space").is_err());
        assert!(SessionId::parse("semi;colon").is_err());
        assert!(SessionId::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn session_id_serializes_as_plain_string() {
        let id = SessionId::parse("ab12cd34").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ab12cd34\"");

        let bad: Result<SessionId, _> = serde_json::from_str("\"not valid!\"");
        assert!(bad.is_err());
    }

    #[test]
    fn peer_id_is_unique() {
        assert_ne!(PeerId::new(), PeerId::new());
    }

    #[test]
    fn peer_id_debug_is_short() {
        let id = PeerId::new();
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("PeerId("));
        assert_eq!(debug.len(), "PeerId(".len() + 8 + 1);
    }
}
