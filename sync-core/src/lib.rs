//! # sync-core
//!
//! Pure logic for floor-sync (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for replication
//! without any network I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`state`]: connection lifecycle and reconnect backoff
//! - [`projection`]: full state → redacted public state
//! - [`replica`]: the reducer seam and origin tagging of applied actions
//! - [`link`]: public-viewer link encoding
//!
//! The actual I/O is performed by `sync-client` and `sync-host`, which
//! interpret the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod link;
pub mod projection;
pub mod replica;
pub mod state;

pub use link::{LinkError, PublicLink};
pub use projection::to_public_state;
pub use replica::{Origin, Reducer, Replica};
pub use state::{Action, Backoff, ConnectionStatus, Event, Lifecycle, RetryPolicy};
