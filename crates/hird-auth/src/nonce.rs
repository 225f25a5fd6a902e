// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Bounded TTL nonce set defending against register replay.
//!
//! A nonce is accepted exactly once per TTL window. The map sweeps expired
//! entries opportunistically (at most every `ttl/2`) and enforces a hard
//! size bound: when full, expired entries are purged first; if the map is
//! still full it is dropped wholesale — refusing new registrations would be
//! worse than re-admitting a nonce whose signature must still verify.

use std::collections::HashMap;
use std::sync::Mutex;

/// Default capacity bound.
pub const DEFAULT_MAX_NONCES: usize = 20_000;

/// Thread-safe single-use nonce set keyed by unix-seconds expiry.
pub struct NonceCache {
    ttl_seconds: i64,
    max: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    /// nonce → expiry (unix seconds).
    entries: HashMap<String, i64>,
    /// Unix seconds of the last opportunistic sweep.
    last_sweep: i64,
}

impl NonceCache {
    pub fn new(ttl_seconds: i64, max: usize) -> Self {
        Self {
            ttl_seconds: ttl_seconds.max(1),
            max: max.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_sweep: 0,
            }),
        }
    }

    /// Consume `nonce` at time `now`.
    ///
    /// Returns `true` iff the nonce is non-empty and was not already present
    /// with an unexpired TTL. On `true` the nonce is recorded until
    /// `now + ttl`.
    pub fn try_use(&self, nonce: &str, now: i64) -> bool {
        if nonce.is_empty() {
            return false;
        }

        let mut inner = self.inner.lock().expect("nonce cache lock poisoned");

        if now - inner.last_sweep >= self.ttl_seconds / 2 {
            inner.entries.retain(|_, expiry| *expiry > now);
            inner.last_sweep = now;
        }

        match inner.entries.get(nonce) {
            Some(expiry) if *expiry > now => return false,
            _ => {}
        }

        if inner.entries.len() >= self.max {
            inner.entries.retain(|_, expiry| *expiry > now);
            if inner.entries.len() >= self.max {
                inner.entries.clear();
            }
        }

        inner.entries.insert(nonce.to_string(), now + self.ttl_seconds);
        true
    }

    /// Current entry count (test/diagnostic use).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("nonce cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
