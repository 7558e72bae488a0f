//! Webhook signature verification. The media server signs each delivery
//! with HMAC-SHA256 over the raw body, carried in the `Authorization`
//! header as `sha256=<hex>`. Verification runs before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::shared::error::MeetError;

type HmacSha256 = Hmac<Sha256>;

pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, body: &[u8], auth_header: Option<&str>) -> Result<(), MeetError> {
        let header = auth_header
            .ok_or_else(|| MeetError::Auth("missing Authorization header".to_string()))?;
        let provided = header
            .strip_prefix("sha256=")
            .unwrap_or(header)
            .trim()
            .to_ascii_lowercase();
        if provided.is_empty() {
            return Err(MeetError::Auth("empty signature".to_string()));
        }

        let expected = self.sign(body);
        if !timing_safe_eq(provided.as_bytes(), expected.as_bytes()) {
            return Err(MeetError::Auth("signature mismatch".to_string()));
        }
        Ok(())
    }

    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Constant-time comparison; the runtime must not depend on where the
/// first differing byte sits.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
