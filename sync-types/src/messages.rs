//! Replication messages and their JSON codec.
//!
//! Every frame on a director channel is one JSON object:
//!
//! ```text
//! { "type": "ACTION",          "payload": <opaque action object> }
//! { "type": "FULL_STATE_SYNC", "payload": <full state minus print targets> }
//! ```
//!
//! Public-viewer channels carry a bare [`PublicState`](crate::PublicState)
//! instead and never see these envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FullState, SyncError};

/// Role hint value a public viewer declares when it connects.
pub const PUBLIC_VIEWER_HINT: &str = "public-viewer";

/// An opaque, serializable instruction for the state reducer.
///
/// The replication layer never interprets an action. It only reads the
/// `type` discriminant for logging and passes the value through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Value);

impl Action {
    /// Build an action in the conventional `{type, payload}` shape.
    pub fn new(kind: &str, payload: Value) -> Self {
        Self(serde_json::json!({ "type": kind, "payload": payload }))
    }

    /// Wrap an arbitrary JSON value.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// The `type` discriminant, if the action carries one.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The `payload` member, if any.
    pub fn payload(&self) -> Option<&Value> {
        self.0.get("payload")
    }

    /// Borrow the raw JSON.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the raw JSON.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Messages exchanged between a host and its directors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    /// One reducer action, relayed verbatim.
    #[serde(rename = "ACTION")]
    Action(Action),
    /// Full-replace snapshot of the authoritative state.
    #[serde(rename = "FULL_STATE_SYNC")]
    FullStateSync(Box<FullState>),
}

impl SyncMessage {
    /// Build a `FULL_STATE_SYNC` from a state, stripping print targets.
    pub fn full_state_sync(state: &FullState) -> Self {
        Self::FullStateSync(Box::new(state.snapshot()))
    }

    /// Short name of the message type, for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Action(_) => "ACTION",
            Self::FullStateSync(_) => "FULL_STATE_SYNC",
        }
    }

    /// Encode as one UTF-8 JSON frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Decode one JSON frame. Unknown `type` values are errors.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(SyncError::Deserialization)
    }

    /// Decode one JSON frame, rejecting frames over `limit` bytes first.
    pub fn from_json_limited(text: &str, limit: usize) -> Result<Self, SyncError> {
        if text.len() > limit {
            return Err(SyncError::MessageTooLarge {
                size: text.len(),
                limit,
            });
        }
        Self::from_json(text)
    }
}

/// Metadata a connecting party may attach at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectMetadata {
    /// Declared role, `"public-viewer"` or anything else.
    #[serde(rename = "type")]
    pub kind: String,
}

impl ConnectMetadata {
    /// Metadata declaring the public-viewer role.
    pub fn public_viewer() -> Self {
        Self {
            kind: PUBLIC_VIEWER_HINT.to_string(),
        }
    }
}

/// Class of an accepted connection, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerRole {
    /// Staff device that both produces and consumes actions.
    Director,
    /// Read-only sink for the public projection.
    PublicViewer,
}

impl PeerRole {
    /// Classify a connection by its metadata. No metadata means director.
    pub fn from_metadata(metadata: Option<&ConnectMetadata>) -> Self {
        match metadata {
            Some(m) if m.kind == PUBLIC_VIEWER_HINT => Self::PublicViewer,
            _ => Self::Director,
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Director => f.write_str("director"),
            Self::PublicViewer => f.write_str(PUBLIC_VIEWER_HINT),
        }
    }
}
