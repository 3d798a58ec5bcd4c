//! Replicated state shapes.
//!
//! The replication layer only looks inside the state where the public
//! projection needs to: a tournament's archive flag and a player's private
//! notes. Everything else rides along as opaque JSON so the business
//! reducer stays free to evolve its own fields.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A tournament entry. Only `id` and `isArchived` are interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    /// Tournament identifier, string or number as the app wrote it.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub id: Value,
    /// Archived tournaments are never shown to public viewers.
    #[serde(default, deserialize_with = "truthy")]
    pub is_archived: bool,
    /// Every other field, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Tournament {
    /// Create a tournament with no extra fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Value::String(id.into()),
            ..Self::default()
        }
    }

    /// True when this tournament's id reads as `id`.
    pub fn has_id(&self, id: &str) -> bool {
        id_matches(&self.id, id)
    }

    /// Look up an opaque field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A player entry. Only `id` and the private `notes` are interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Player identifier, string or number as the app wrote it.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub id: Value,
    /// Staff-only notes. Always blank in a [`PublicState`].
    #[serde(default, deserialize_with = "text")]
    pub notes: String,
    /// Every other field, untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Player {
    /// Create a player with no extra fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Value::String(id.into()),
            ..Self::default()
        }
    }

    /// True when this player's id reads as `id`.
    pub fn has_id(&self, id: &str) -> bool {
        id_matches(&self.id, id)
    }
}

fn id_matches(value: &Value, id: &str) -> bool {
    match value {
        Value::String(s) => s == id,
        Value::Number(n) => n.to_string() == id,
        _ => false,
    }
}

/// Reads a JSON flag the way the app tests it: `null` and missing are false.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// Reads free text; `null` becomes empty and anything else keeps its JSON text.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// UI-local print selections. Never replicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintTargets {
    /// Tournament queued for printing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_to_print: Option<Value>,
    /// Seating chart queued for printing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seating_to_print: Option<Value>,
}

impl PrintTargets {
    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tournament_to_print.is_none() && self.seating_to_print.is_none()
    }
}

/// The complete authoritative state held by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    /// All tournaments, archived ones included.
    #[serde(default)]
    pub tournaments: Vec<Tournament>,
    /// All players, with private notes.
    #[serde(default)]
    pub players: Vec<Player>,
    /// Seasons (opaque).
    #[serde(default)]
    pub seasons: Vec<Value>,
    /// Cash game tables (opaque).
    #[serde(default)]
    pub cash_game_tables: Vec<Value>,
    /// Cash game sessions (opaque).
    #[serde(default)]
    pub cash_game_sessions: Vec<Value>,
    /// Transient print selections.
    #[serde(flatten)]
    pub print: PrintTargets,
    /// Remaining top-level state, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FullState {
    /// Copy of this state with the print targets stripped, ready to replicate.
    pub fn snapshot(&self) -> Self {
        Self {
            print: PrintTargets::default(),
            ..self.clone()
        }
    }

    /// Find a tournament by id.
    pub fn tournament(&self, id: &str) -> Option<&Tournament> {
        self.tournaments.iter().find(|t| t.has_id(id))
    }

    /// Find a tournament by id, mutably.
    pub fn tournament_mut(&mut self, id: &str) -> Option<&mut Tournament> {
        self.tournaments.iter_mut().find(|t| t.has_id(id))
    }

    /// Find a player by id.
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.has_id(id))
    }
}

/// Read-only, privacy-filtered view pushed to public viewers.
///
/// Travels bare on the wire: public-viewer channels carry nothing else,
/// so there is no envelope `type` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicState {
    /// Non-archived tournaments only.
    #[serde(default)]
    pub tournaments: Vec<Tournament>,
    /// Players with `notes` blanked.
    #[serde(default)]
    pub players: Vec<Player>,
    /// Seasons (opaque).
    #[serde(default)]
    pub seasons: Vec<Value>,
    /// Cash game tables (opaque).
    #[serde(default)]
    pub cash_game_tables: Vec<Value>,
    /// Cash game sessions (opaque).
    #[serde(default)]
    pub cash_game_sessions: Vec<Value>,
}

impl PublicState {
    /// Encode as the bare JSON push payload.
    pub fn to_json(&self) -> Result<String, crate::SyncError> {
        serde_json::to_string(self).map_err(crate::SyncError::Serialization)
    }

    /// Decode a bare JSON push payload.
    pub fn from_json(text: &str) -> Result<Self, crate::SyncError> {
        serde_json::from_str(text).map_err(crate::SyncError::Deserialization)
    }
}
