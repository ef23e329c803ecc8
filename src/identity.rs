//! Anonymous per-browser client identity.
//!
//! The identity is a random token that the browser keeps in its own storage
//! (the `clientId` cookie) and presents on every request. It is read if
//! present and created once if absent; nothing in this crate ever deletes it.

use std::fmt;

use uuid::Uuid;

/// Name of the browser storage entry holding the identity.
pub const CLIENT_ID_KEY: &str = "clientId";

/// Maximum accepted identifier length.
const MAX_LEN: usize = 64;

/// Token identifying one browser to the scheduling backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a stored identifier if it is safe to place in a URL path.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    /// Read the stored identity, or create one.
    ///
    /// Returns the identity and whether it was newly created (so the caller
    /// knows it must persist it).
    #[must_use]
    pub fn load_or_create(stored: Option<&str>) -> (Self, bool) {
        match stored.and_then(Self::parse) {
            Some(id) => (id, false),
            None => (Self::generate(), true),
        }
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
