//! Session id and public link helpers.

use anyhow::{Context, Result};
use sync_core::PublicLink;
use sync_types::SessionId;

/// Print a fresh session id.
pub fn generate() -> Result<()> {
    let session = SessionId::generate().context("Failed to generate session id")?;
    println!("{}", session);
    Ok(())
}

/// Print the public-viewer link for `session`.
pub fn link(session: &str, base: &str) -> Result<()> {
    println!("{}", public_url(session, base)?);
    Ok(())
}

fn public_url(session: &str, base: &str) -> Result<String> {
    let session =
        SessionId::parse(session).with_context(|| format!("Invalid session id '{}'", session))?;
    Ok(PublicLink::new(session).to_url(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_without_base_is_the_fragment() {
        assert_eq!(public_url("ab12cd34", "").unwrap(), "#/public?sync=ab12cd34");
    }

    #[test]
    fn public_url_joins_base() {
        assert_eq!(
            public_url("ab12cd34", "https://floor.example").unwrap(),
            "https://floor.example/#/public?sync=ab12cd34"
        );
    }

    #[test]
    fn public_url_rejects_bad_session() {
        let err = public_url("not a session", "").unwrap_err();
        assert!(err.to_string().contains("Invalid session id"));
    }
}
