//! # sync-host
//!
//! Host side of floor-sync and the role manager that decides between
//! hosting and directing.
//!
//! The host owns the authoritative [`FullState`](sync_types::FullState).
//! It accepts director and public-viewer connections on a session id,
//! sends each newcomer its initial state, relays director actions to the
//! other directors and keeps public viewers fed with the redacted
//! projection.
//!
//! ## Modules
//!
//! - [`server`]: the host engine and its counters
//! - [`registry`]: live connections with per-peer outboxes
//! - [`session`]: per-connection read loop
//! - [`protocol`]: accept loop
//! - [`authority`]: the [`HostAuthority`] seam
//! - [`role`]: [`RoleManager`], the entry point for applications
//! - [`config`]: limits and viewer backoff, loadable from TOML

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authority;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod role;
pub mod server;
pub mod session;

pub use authority::HostAuthority;
pub use config::{ConfigError, HostConfig, HostLimits, ViewerConfig};
pub use error::{HostError, Result};
pub use protocol::serve;
pub use registry::{ConnectionRegistry, PeerConnection};
pub use role::{Role, RoleManager};
pub use server::{HostEngine, HostMetrics};
