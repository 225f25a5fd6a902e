// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The pending-request matcher: `request_id → buffered(1) channel`.
//!
//! Callers register before sending and deregister on every exit path.
//! Delivery is non-blocking and at-most-once: a result whose waiter has
//! already timed out or vanished is dropped on the floor — the caller has
//! abandoned the request, nobody is owed a reply.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use hird_proto::Envelope;

#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, mpsc::Sender<Envelope>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply slot for `request_id`. Capacity 1: one request, one
    /// reply.
    pub fn register(&self, request_id: &str) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(1);
        self.inner
            .lock()
            .expect("pending lock poisoned")
            .insert(request_id.to_string(), tx);
        rx
    }

    pub fn deregister(&self, request_id: &str) {
        self.inner
            .lock()
            .expect("pending lock poisoned")
            .remove(request_id);
    }

    /// Deliver a reply. Returns `false` when it was dropped (no waiter, or
    /// the waiter's buffer is already full).
    pub fn deliver(&self, request_id: &str, env: Envelope) -> bool {
        let tx = self
            .inner
            .lock()
            .expect("pending lock poisoned")
            .get(request_id)
            .cloned();
        match tx {
            Some(tx) => match tx.try_send(env) {
                Ok(()) => true,
                Err(_) => {
                    debug!(request = request_id, "reply dropped: waiter gone or full");
                    false
                }
            },
            None => {
                debug!(request = request_id, "reply dropped: no waiter");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hird_proto::MessageType;

    fn env() -> Envelope {
        Envelope::new(MessageType::AgentResult, serde_json::json!({"status": "completed"}))
    }

    #[tokio::test]
    async fn registered_waiter_receives_reply() {
        let pending = PendingRequests::new();
        let mut rx = pending.register("req-1");
        assert!(pending.deliver("req-1", env()));
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn reply_without_waiter_is_dropped() {
        let pending = PendingRequests::new();
        assert!(!pending.deliver("req-unknown", env()));
    }

    #[test]
    fn deregistered_waiter_no_longer_matches() {
        let pending = PendingRequests::new();
        let _rx = pending.register("req-1");
        pending.deregister("req-1");
        assert!(!pending.deliver("req-1", env()));
        assert!(pending.is_empty());
    }

    #[test]
    fn second_delivery_is_dropped_not_blocked() {
        let pending = PendingRequests::new();
        let _rx = pending.register("req-1");
        assert!(pending.deliver("req-1", env()));
        // Buffer is 1 and nobody drained it — non-blocking drop.
        assert!(!pending.deliver("req-1", env()));
    }

    #[test]
    fn distinct_requests_have_distinct_slots() {
        let pending = PendingRequests::new();
        let _rx1 = pending.register("a");
        let _rx2 = pending.register("b");
        assert_eq!(pending.len(), 2);
        assert!(pending.deliver("a", env()));
        assert!(pending.deliver("b", env()));
    }
}
