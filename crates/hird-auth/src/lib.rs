// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Registration authentication for the hird cluster.
//!
//! A slave proves possession of the shared secret by signing
//! `slave_id\n<ts>\n<nonce>` with HMAC-SHA256. The master checks the
//! signature in constant time, gates on clock skew, and consumes the nonce
//! so a captured register frame cannot be replayed.
//!
//! # Security surface
//!
//! [`Verifier::verify`] returns a single opaque [`AuthError`] on any failure.
//! The concrete reason (skew, replay, signature mismatch, …) is logged at
//! `warn` and never sent to the peer — a probing client learns nothing about
//! which check it tripped.

mod nonce;
mod secret;
mod verifier;

pub use nonce::NonceCache;
pub use secret::{decode_secret, generate_secret, SecretError, MIN_SECRET_BYTES};
pub use verifier::{sign, AuthError, Verifier, DEFAULT_SKEW_SECONDS};
