// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Shared-secret handling.
//!
//! The cluster secret is persisted as base64 in the cluster config file and
//! must decode to at least [`MIN_SECRET_BYTES`] bytes. Generation uses the
//! OS CSPRNG, same as every other key material in this codebase.

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Minimum decoded secret length. Anything shorter is trivially brute-forced.
pub const MIN_SECRET_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("secret too short: {0} bytes (minimum {MIN_SECRET_BYTES})")]
    TooShort(usize),

    #[error("secret is empty")]
    Empty,
}

/// Decode a base64 secret and enforce the minimum length.
pub fn decode_secret(b64: &str) -> Result<Vec<u8>, SecretError> {
    let trimmed = b64.trim();
    if trimmed.is_empty() {
        return Err(SecretError::Empty);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(trimmed)?;
    if bytes.len() < MIN_SECRET_BYTES {
        return Err(SecretError::TooShort(bytes.len()));
    }
    Ok(bytes)
}

/// Generate a fresh 256-bit secret, base64-encoded for the config file.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

// ── Unit tests ────────────────────────────────────────────────────────────────
