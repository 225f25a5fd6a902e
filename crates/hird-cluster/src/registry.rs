// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The in-memory slave registry — the single owner of connection state.
//!
//! Every mutation is a short critical section under one RW lock; snapshots
//! copy records out so no caller ever holds the lock across I/O. The
//! registry also guards against the classic reconnect race: when a slave
//! reconnects, the old handler's deferred `set_offline` must not clobber
//! the new session — offline transitions only apply if the caller still
//! owns the current session.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaveStatus {
    Online,
    Offline,
}

/// Everything the master knows about one slave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveInfo {
    pub slave_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    pub status: SlaveStatus,
    #[serde(default)]
    pub remote_addr: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

struct Entry {
    info: SlaveInfo,
    session: Option<Arc<Session>>,
}

/// Thread-safe `slave_id → (info, session)` map.
#[derive(Default)]
pub struct SlaveRegistry {
    inner: RwLock<HashMap<String, Entry>>,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slave as online, atomically swapping in its new session.
    ///
    /// Returns the previous session (if any) so the handler can forcibly
    /// close the evicted connection — the registry itself never does I/O.
    pub fn set_online(&self, info: SlaveInfo, session: Arc<Session>) -> Option<Arc<Session>> {
        let mut map = self.inner.write().expect("registry lock poisoned");
        let prior = map.insert(
            info.slave_id.clone(),
            Entry {
                info,
                session: Some(session),
            },
        );
        prior.and_then(|e| e.session)
    }

    /// Mark a slave offline — but only if `session` is still the current
    /// one. A stale handler for a replaced connection is a no-op here.
    pub fn set_offline(
        &self,
        slave_id: &str,
        session: &Arc<Session>,
        last_seen: DateTime<Utc>,
    ) -> bool {
        let mut map = self.inner.write().expect("registry lock poisoned");
        let Some(entry) = map.get_mut(slave_id) else {
            return false;
        };
        let owns = entry
            .session
            .as_ref()
            .is_some_and(|cur| Arc::ptr_eq(cur, session));
        if !owns {
            return false;
        }
        entry.session = None;
        entry.info.status = SlaveStatus::Offline;
        entry.info.last_seen = last_seen;
        true
    }

    /// Bump `last_seen`; with a live session the status is normalized back
    /// to online (heartbeats can outrun a racing offline mark).
    pub fn mark_seen(&self, slave_id: &str, when: DateTime<Utc>) {
        let mut map = self.inner.write().expect("registry lock poisoned");
        if let Some(entry) = map.get_mut(slave_id) {
            entry.info.last_seen = when;
            if entry.session.is_some() {
                entry.info.status = SlaveStatus::Online;
            }
        }
    }

    pub fn get(&self, slave_id: &str) -> Option<SlaveInfo> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(slave_id)
            .map(|e| e.info.clone())
    }

    /// The live session for a slave, if it is online.
    pub fn session_of(&self, slave_id: &str) -> Option<Arc<Session>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(slave_id)
            .and_then(|e| e.session.clone())
    }

    /// Copy of all records, optionally restricted to online slaves.
    pub fn snapshot(&self, only_online: bool) -> Vec<SlaveInfo> {
        let map = self.inner.read().expect("registry lock poisoned");
        let mut out: Vec<SlaveInfo> = map
            .values()
            .filter(|e| !only_online || e.info.status == SlaveStatus::Online)
            .map(|e| e.info.clone())
            .collect();
        out.sort_by(|a, b| a.slave_id.cmp(&b.slave_id));
        out
    }

    /// Remove a record entirely. The caller owns whatever cleanup the
    /// returned record implies (presence, sessions).
    pub fn delete(&self, slave_id: &str) -> Option<SlaveInfo> {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .remove(slave_id)
            .map(|e| e.info)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
