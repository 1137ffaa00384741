//! Keyed MAC over canonical payload encodings.
//!
//! Deterministic symmetric authentication: a payload is canonicalized
//! (RFC 8785) before the MAC is computed, so byte-identical signatures come
//! out of any client that canonicalizes correctly. Signatures travel as
//! lowercase hex on the wire. Verification recomputes and compares in
//! constant time.
//!
//! The shared secret is loaded once at process start and never logged.
//! Rotating it invalidates all in-flight challenges; callers treat rotation
//! as equivalent to a restart.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::canonicalize_json;
use crate::infra::Result;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer/verifier bound to the process secret.
pub struct KeyedMac {
    secret: SecretVec<u8>,
}

impl KeyedMac {
    pub fn new(secret: SecretVec<u8>) -> Self {
        Self { secret }
    }

    /// Sign a payload: lowercase hex HMAC-SHA256 over its canonical encoding.
    pub fn sign(&self, payload: &serde_json::Value) -> Result<String> {
        let canonical = canonicalize_json(payload)?;
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Recompute the MAC and compare against a wire signature in constant time.
    ///
    /// Malformed hex or an uncanonicalizable payload verifies as `false`
    /// rather than erroring; a forged signature is not an internal failure.
    pub fn verify(&self, payload: &serde_json::Value, signature_hex: &str) -> bool {
        let expected = match self.sign(payload) {
            Ok(hex) => hex,
            Err(_) => return false,
        };
        let Ok(provided) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(expected_bytes) = hex::decode(&expected) else {
            return false;
        };
        expected_bytes.ct_eq(&provided).into()
    }
}

impl std::fmt::Debug for KeyedMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedMac")
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Constant-time equality for short wire tokens (challenge codes, nonces).
///
/// Length differences return `false` without early-exit timing on content.
pub fn tokens_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
