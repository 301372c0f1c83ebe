//! Opaque identifiers used throughout the blob lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account identifier. Newtype over `String` so account/blob ids can't be
/// swapped by accident at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Blob identifier: an opaque unique token (spec.md §4.5: "128-bit random
/// encoded"). Rendered as unpadded base64url, which satisfies RFC 8620's
/// `Id` grammar (`[A-Za-z0-9_-]{1,255}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl BlobId {
    /// Generates a new random blob id from 128 bits of randomness.
    #[must_use]
    pub fn generate() -> Self {
        use base64::Engine;
        let uuid = uuid::Uuid::new_v4();
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(uuid.as_bytes());
        Self(encoded)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_blob_ids_are_unique_and_url_safe() {
        let a = BlobId::generate();
        let b = BlobId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
