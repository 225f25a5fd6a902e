// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Presence — a best-effort, TTL'd replica of the registry in an external
//! KV store, so sibling master instances can locate slaves.
//!
//! Presence is advisory: the registry stays authoritative, upsert/delete
//! failures are swallowed (logged at debug), and a missing backend is a
//! perfectly fine deployment — the default is a no-op.
//!
//! Keys written per slave:
//! - `gateway:slave:{id}` → full [`SlaveInfo`] plus the owning master id
//! - `gateway:route:{id}` → the owning master id alone

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::registry::SlaveInfo;

/// Capability set the master needs from a presence backend.
#[async_trait]
pub trait Presence: Send + Sync {
    async fn upsert(&self, info: &SlaveInfo, owner_id: &str, ttl: Duration);
    async fn delete(&self, slave_id: &str);
    async fn close(&self);
}

/// Default backend: remembers nothing, fails never.
pub struct NoopPresence;

#[async_trait]
impl Presence for NoopPresence {
    async fn upsert(&self, _info: &SlaveInfo, _owner_id: &str, _ttl: Duration) {}
    async fn delete(&self, _slave_id: &str) {}
    async fn close(&self) {}
}

// ── KV-backed presence ────────────────────────────────────────────────────────

/// Minimal TTL'd KV interface a remote store must satisfy.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// Presence replicated into any [`KvStore`].
pub struct KvPresence<K: KvStore> {
    kv: K,
}

impl<K: KvStore> KvPresence<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    fn slave_key(slave_id: &str) -> String {
        format!("gateway:slave:{slave_id}")
    }

    fn route_key(slave_id: &str) -> String {
        format!("gateway:route:{slave_id}")
    }
}

#[async_trait]
impl<K: KvStore> Presence for KvPresence<K> {
    async fn upsert(&self, info: &SlaveInfo, owner_id: &str, ttl: Duration) {
        let doc = serde_json::json!({ "info": info, "owner_id": owner_id });
        let payload = match serde_json::to_string(&doc) {
            Ok(p) => p,
            Err(e) => {
                debug!(slave = %info.slave_id, "presence serialize failed: {e}");
                return;
            }
        };
        if let Err(e) = self
            .kv
            .set_with_ttl(&Self::slave_key(&info.slave_id), payload, ttl)
            .await
        {
            debug!(slave = %info.slave_id, "presence upsert failed: {e}");
        }
        if let Err(e) = self
            .kv
            .set_with_ttl(&Self::route_key(&info.slave_id), owner_id.to_string(), ttl)
            .await
        {
            debug!(slave = %info.slave_id, "presence route upsert failed: {e}");
        }
    }

    async fn delete(&self, slave_id: &str) {
        if let Err(e) = self.kv.delete(&Self::slave_key(slave_id)).await {
            debug!(slave = slave_id, "presence delete failed: {e}");
        }
        if let Err(e) = self.kv.delete(&Self::route_key(slave_id)).await {
            debug!(slave = slave_id, "presence route delete failed: {e}");
        }
    }

    async fn close(&self) {
        if let Err(e) = self.kv.close().await {
            debug!("presence close failed: {e}");
        }
    }
}

// ── In-memory KV (tests, single-host setups) ─────────────────────────────────

/// TTL'd in-process KV. Useful in tests and as a reference implementation.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        let map = self.entries.lock().expect("kv lock poisoned");
        map.get(key).and_then(|(value, expiry)| {
            if *expiry > Instant::now() {
                Some(value.clone())
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("kv lock poisoned")
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().expect("kv lock poisoned").remove(key);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
