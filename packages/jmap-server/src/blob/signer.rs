//! CDN download URL signing (spec.md §4.9): a time-limited signed URL
//! distinct from the object store's own `presign_download`, fronted by a
//! CDN rather than hitting the object store directly.
//!
//! Modeled as a trait so the signing key material and algorithm are
//! swappable without touching [`super::download`]; the HMAC
//! implementation here is deterministic and exercised directly in tests,
//! the way the teacher's auth layer keeps cryptographic primitives behind
//! a narrow trait boundary.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Produces a signed, time-limited CDN URL for a given object key.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, object_key: &str, expires_at_ms: i64) -> String;
}

/// HMAC-SHA256 signer over `{cdnDomain}/{objectKey}?Expires={expiresAtMs}&Signature={sig}`.
///
/// The signature covers the object key and expiry together so a URL can't
/// be replayed against a different key or have its expiry extended.
pub struct HmacUrlSigner {
    cdn_domain: String,
    key_id: String,
    secret: Vec<u8>,
}

impl HmacUrlSigner {
    #[must_use]
    pub fn new(cdn_domain: impl Into<String>, key_id: impl Into<String>, secret: Vec<u8>) -> Self {
        Self { cdn_domain: cdn_domain.into(), key_id: key_id.into(), secret }
    }

    fn signature(&self, object_key: &str, expires_at_ms: i64) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(object_key.as_bytes());
        mac.update(b"|");
        mac.update(expires_at_ms.to_string().as_bytes());
        let bytes = mac.finalize().into_bytes();
        use base64::Engine;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl UrlSigner for HmacUrlSigner {
    fn sign(&self, object_key: &str, expires_at_ms: i64) -> String {
        let sig = self.signature(object_key, expires_at_ms);
        format!(
            "https://{}/{object_key}?Expires={expires_at_ms}&KeyId={}&Signature={sig}",
            self.cdn_domain, self.key_id
        )
    }
}
