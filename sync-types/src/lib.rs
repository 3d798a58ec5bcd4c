//! # sync-types
//!
//! Wire format and state types for floor-sync.
//!
//! This crate provides the foundational types used across all floor-sync crates:
//! - [`SessionId`], [`PeerId`] - Session and connection identity
//! - [`SyncMessage`], [`Action`] - The two replicated message shapes and their codec
//! - [`ConnectMetadata`], [`PeerRole`] - Role hint declared at connect time
//! - [`FullState`], [`PublicState`] - Authoritative snapshot and its public projection
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod state;

pub use error::SyncError;
pub use ids::{PeerId, SessionId, SESSION_ID_LEN};
pub use messages::{Action, ConnectMetadata, PeerRole, SyncMessage, PUBLIC_VIEWER_HINT};
pub use state::{FullState, Player, PrintTargets, PublicState, Tournament};
