//! Public-viewer links.
//!
//! A public viewer is started from a URL whose fragment carries the
//! session id:
//!
//! ```text
//! https://floor.example/#/public?sync=ab12cd34
//! ```
//!
//! The same string is what the QR collaborator encodes, so parsing accepts
//! both full URLs and the bare fragment.

use sync_types::{SessionId, SyncError};
use thiserror::Error;

/// Route of the public view.
pub const PUBLIC_ROUTE: &str = "#/public";

/// Query key that carries the session id.
pub const SYNC_PARAM: &str = "sync";

/// Error type for link parsing.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No `sync=` parameter in the link.
    #[error("link has no sync= parameter")]
    MissingSession,
    /// The `sync=` value is not a valid session id.
    #[error("invalid session in link: {0}")]
    InvalidSession(#[from] SyncError),
}

/// Address of a session's public view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicLink {
    session: SessionId,
}

impl PublicLink {
    /// Link to the public view of `session`.
    pub fn new(session: SessionId) -> Self {
        Self { session }
    }

    /// Session this link points at.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Consume the link, returning its session.
    pub fn into_session(self) -> SessionId {
        self.session
    }

    /// The fragment form: `#/public?sync=<id>`.
    pub fn fragment(&self) -> String {
        format!("{}?{}={}", PUBLIC_ROUTE, SYNC_PARAM, self.session)
    }

    /// Append the fragment to a base URL, replacing any fragment it had.
    pub fn to_url(&self, base: &str) -> String {
        let base = base.split('#').next().unwrap_or(base);
        let base = if base.is_empty() || base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        format!("{}{}", base, self.fragment())
    }

    /// Parse a full URL or bare fragment.
    ///
    /// Other query parameters are ignored; the first `sync=` wins.
    pub fn parse(raw: &str) -> Result<Self, LinkError> {
        let value = raw
            .trim()
            .split(['?', '&', '#'])
            .find_map(|part| part.strip_prefix("sync="))
            .ok_or(LinkError::MissingSession)?;

        let session = SessionId::parse(value)?;
        Ok(Self { session })
    }
}

impl std::fmt::Display for PublicLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fragment())
    }
}
