//! # sync-client
//!
//! Client-side replication engines for floor-sync.
//!
//! Two roles join a session someone else hosts:
//!
//! - **Director** ([`DirectorClient`]): a staff device. Receives the host's
//!   full snapshot, applies relayed actions, and forwards its own actions.
//!   Never retries on its own.
//! - **Public viewer** ([`PublicViewer`]): a read-only screen started from a
//!   public link. Receives redacted projections and reconnects with
//!   exponential backoff.
//!
//! Both talk to the host through the [`transport`] seam; the lifecycle
//! decisions come from the pure state machine in `sync-core`.
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{DirectorClient, MemorySignaling, SharedReplica, StatusCell};
//!
//! let replica = SharedReplica::new(FullState::default(), my_reducer);
//! let director = DirectorClient::new(signaling, replica, StatusCell::new(RetryPolicy::Manual));
//!
//! director.connect(&session).await?;
//! director.dispatch(Action::new("NEXT_LEVEL", json!({ "tournamentId": "t1" }))).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod director;
pub mod error;
pub mod replica;
pub mod status;
pub mod transport;
pub mod viewer;

pub use director::DirectorClient;
pub use error::ClientError;
pub use replica::SharedReplica;
pub use status::StatusCell;
pub use transport::{
    Channel, Incoming, Listener, MemoryChannel, MemorySignaling, Signaling, TransportError,
    MAX_MESSAGE_SIZE,
};
pub use viewer::PublicViewer;
