// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! HMAC-SHA256 registration signatures.
//!
//! # Signature input
//!
//! ```text
//! UTF8(slave_id) || 0x0A || UTF8(decimal ts) || 0x0A || UTF8(nonce)
//! ```
//!
//! Output is the lowercase hex digest. Verification decodes both hex strings
//! and compares the raw bytes with [`subtle::ConstantTimeEq`] so the compare
//! cost never depends on where the first mismatching byte sits.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::nonce::{NonceCache, DEFAULT_MAX_NONCES};

/// Default accepted clock skew between master and slave.
pub const DEFAULT_SKEW_SECONDS: i64 = 60;

/// The single error surfaced to peers. Deliberately carries no detail.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("auth failed")]
pub struct AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Sign `(slave_id, ts, nonce)` with the shared secret.
pub fn sign(secret: &[u8], slave_id: &str, ts: i64, nonce: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(slave_id.as_bytes());
    mac.update(b"\n");
    mac.update(ts.to_string().as_bytes());
    mac.update(b"\n");
    mac.update(nonce.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies register signatures: clock-skew gate, single-use nonce, and a
/// constant-time signature compare.
pub struct Verifier {
    secret: Vec<u8>,
    skew_seconds: i64,
    nonces: NonceCache,
}

impl Verifier {
    pub fn new(secret: Vec<u8>, skew_seconds: i64) -> Self {
        // Nonce TTL spans the full accept window [now-skew, now+skew].
        let skew = skew_seconds.max(1);
        Self {
            secret,
            skew_seconds: skew,
            nonces: NonceCache::new(skew * 2, DEFAULT_MAX_NONCES),
        }
    }

    pub fn with_defaults(secret: Vec<u8>) -> Self {
        Self::new(secret, DEFAULT_SKEW_SECONDS)
    }

    /// Verify a registration at time `now` (unix seconds).
    ///
    /// The returned error is always the opaque "auth failed"; the concrete
    /// reason is logged here and goes no further.
    pub fn verify(
        &self,
        slave_id: &str,
        ts: i64,
        nonce: &str,
        sig: &str,
        now: i64,
    ) -> Result<(), AuthError> {
        if let Err(reason) = self.verify_inner(slave_id, ts, nonce, sig, now) {
            warn!(slave_id, reason, "registration auth rejected");
            return Err(AuthError);
        }
        Ok(())
    }

    fn verify_inner(
        &self,
        slave_id: &str,
        ts: i64,
        nonce: &str,
        sig: &str,
        now: i64,
    ) -> Result<(), &'static str> {
        if slave_id.is_empty() || nonce.is_empty() || sig.is_empty() || ts == 0 {
            return Err("missing field");
        }
        if (now - ts).abs() > self.skew_seconds {
            return Err("timestamp outside skew window");
        }
        // Consume the nonce before the signature check: a replayed frame is
        // rejected even when its signature is valid.
        if !self.nonces.try_use(nonce, now) {
            return Err("nonce already used");
        }

        let expected = hex::decode(sign(&self.secret, slave_id, ts, nonce))
            .map_err(|_| "internal hex error")?;
        let received = hex::decode(sig).map_err(|_| "signature is not hex")?;
        if received.len() != expected.len() {
            return Err("signature length mismatch");
        }
        if !bool::from(received.ct_eq(&expected)) {
            return Err("signature mismatch");
        }
        Ok(())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const NOW: i64 = 1_735_689_600;

    fn verifier() -> Verifier {
        Verifier::with_defaults(SECRET.to_vec())
    }

    #[test]
    fn sign_is_deterministic() {
        let a = sign(SECRET, "s1", NOW, "n-1");
        let b = sign(SECRET, "s1", NOW, "n-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "hex SHA-256 digest");
        assert_eq!(a, a.to_lowercase(), "digest must be lowercase hex");
    }

    #[test]
    fn sign_varies_with_every_input() {
        let base = sign(SECRET, "s1", NOW, "n-1");
        assert_ne!(base, sign(SECRET, "s2", NOW, "n-1"));
        assert_ne!(base, sign(SECRET, "s1", NOW + 1, "n-1"));
        assert_ne!(base, sign(SECRET, "s1", NOW, "n-2"));
        assert_ne!(base, sign(b"other-secret-16b", "s1", NOW, "n-1"));
    }

    #[test]
    fn valid_signature_verifies() {
        let v = verifier();
        let sig = sign(SECRET, "s1", NOW, "n-1");
        assert!(v.verify("s1", NOW, "n-1", &sig, NOW).is_ok());
    }

    #[test]
    fn replayed_register_is_rejected() {
        let v = verifier();
        let sig = sign(SECRET, "s1", NOW, "n-1");
        assert!(v.verify("s1", NOW, "n-1", &sig, NOW).is_ok());
        assert_eq!(v.verify("s1", NOW, "n-1", &sig, NOW + 1), Err(AuthError));
    }

    #[test]
    fn skewed_timestamp_is_rejected() {
        let v = verifier();
        let ts = NOW - DEFAULT_SKEW_SECONDS - 1;
        let sig = sign(SECRET, "s1", ts, "n-1");
        assert_eq!(v.verify("s1", ts, "n-1", &sig, NOW), Err(AuthError));
    }

    #[test]
    fn timestamp_at_skew_boundary_is_accepted() {
        let v = verifier();
        let ts = NOW - DEFAULT_SKEW_SECONDS;
        let sig = sign(SECRET, "s1", ts, "n-1");
        assert!(v.verify("s1", ts, "n-1", &sig, NOW).is_ok());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let v = verifier();
        let mut sig = sign(SECRET, "s1", NOW, "n-1");
        let last = sig.pop().unwrap();
        sig.push(if last == '0' { '1' } else { '0' });
        assert_eq!(v.verify("s1", NOW, "n-1", &sig, NOW), Err(AuthError));
    }

    #[test]
    fn empty_fields_are_rejected() {
        let v = verifier();
        let sig = sign(SECRET, "s1", NOW, "n-1");
        assert_eq!(v.verify("", NOW, "n-1", &sig, NOW), Err(AuthError));
        assert_eq!(v.verify("s1", NOW, "", &sig, NOW), Err(AuthError));
        assert_eq!(v.verify("s1", NOW, "n-1", "", NOW), Err(AuthError));
        assert_eq!(v.verify("s1", 0, "n-1", &sig, NOW), Err(AuthError));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let v = verifier();
        assert_eq!(
            v.verify("s1", NOW, "n-1", "zz-not-hex", NOW),
            Err(AuthError)
        );
    }

    #[test]
    fn uppercase_hex_signature_still_verifies() {
        let v = verifier();
        let sig = sign(SECRET, "s1", NOW, "n-1").to_uppercase();
        assert!(v.verify("s1", NOW, "n-1", &sig, NOW).is_ok());
    }
}
