// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The transfer engine: owns all in-flight transfers for one host.
//!
//! One engine instance serves every connection on a host. Incoming
//! transfers are keyed by `(peer_id, transfer_id)` so a disconnecting peer
//! can be swept by prefix without back-pointers from the session layer.
//! Initiator flows (push, pull) park on per-transfer reply channels; the
//! connection reader routes offer/accept/reject/ack envelopes to them by
//! `transfer_id` and drops replies nobody is waiting for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use hird_proto::payload::{
    FileAcceptPayload, FileAckPayload, FileCancelPayload, FileCompletePayload, FileOfferPayload,
    FileRejectPayload, TransferStatus,
};
use hird_proto::{decode_chunk, Envelope, MessageType};

use crate::incoming::IncomingTransfer;
use crate::TransferError;

// ── Outbound seam ─────────────────────────────────────────────────────────────

/// Write half of a peer connection, as the engine sees it.
///
/// Implemented by the cluster session. Sends are serialized by the session's
/// write lock; the engine never assumes it is the only writer.
#[async_trait]
pub trait WireSender: Send + Sync {
    async fn send_envelope(&self, env: Envelope) -> anyhow::Result<()>;
    async fn send_binary(&self, frame: Vec<u8>) -> anyhow::Result<()>;
}

// ── Limits ────────────────────────────────────────────────────────────────────

/// Per-host transfer limits. Every field has a production default and is
/// individually overridable from the cluster config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub retention_days: u32,
    pub chunk_size_bytes: u64,
    pub max_inflight_chunks: u32,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 2 * 1024 * 1024 * 1024,
            max_total_bytes: 20 * 1024 * 1024 * 1024,
            retention_days: 7,
            chunk_size_bytes: 256 * 1024,
            max_inflight_chunks: 8,
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct TransferEngine {
    root: PathBuf,
    limits: TransferLimits,
    incoming: Mutex<HashMap<(String, String), IncomingTransfer>>,
    /// transfer_id → reply channel for the local initiator of that transfer.
    replies: Mutex<HashMap<String, mpsc::Sender<Envelope>>>,
}

impl TransferEngine {
    /// Create the engine and its directory skeleton under `root`.
    pub fn new(root: impl Into<PathBuf>, limits: TransferLimits) -> crate::Result<Self> {
        let root = root.into();
        for sub in ["inbox", "outbox", "tmp"] {
            std::fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self {
            root,
            limits,
            incoming: Mutex::new(HashMap::new()),
            replies: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    // ── Initiator reply routing ───────────────────────────────────────────────

    /// Register the reply channel for a locally initiated transfer.
    pub fn register_reply(&self, transfer_id: &str) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(8);
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .insert(transfer_id.to_string(), tx);
        rx
    }

    pub fn deregister_reply(&self, transfer_id: &str) {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .remove(transfer_id);
    }

    /// True if a local initiator is waiting on this transfer id.
    pub fn has_reply_waiter(&self, transfer_id: &str) -> bool {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .contains_key(transfer_id)
    }

    /// Route a transfer-lifecycle envelope to the waiting initiator.
    /// Delivery is non-blocking; with no (or a gone) waiter it is dropped.
    pub fn deliver_reply(&self, transfer_id: &str, env: Envelope) {
        let tx = self
            .replies
            .lock()
            .expect("replies lock poisoned")
            .get(transfer_id)
            .cloned();
        match tx {
            Some(tx) => {
                if tx.try_send(env).is_err() {
                    debug!(transfer = transfer_id, "reply waiter gone, dropping frame");
                }
            }
            None => debug!(transfer = transfer_id, "no reply waiter, dropping frame"),
        }
    }

    // ── Receiver-side handlers ────────────────────────────────────────────────

    /// Handle an inbound `file.offer`: validate limits, open the partial
    /// file, and answer with `file.accept` (or `file.reject`).
    pub async fn handle_offer<S: WireSender + ?Sized>(
        &self,
        peer_id: &str,
        offer: FileOfferPayload,
        sink: &S,
    ) -> anyhow::Result<()> {
        if let Err(e) = self.admit_offer(&offer) {
            warn!(peer = peer_id, transfer = %offer.transfer_id, "offer rejected: {e}");
            let reject = FileRejectPayload {
                transfer_id: offer.transfer_id.clone(),
                reason: Some(e.to_string()),
            };
            return sink
                .send_envelope(Envelope::from_payload(MessageType::FileReject, &reject)?)
                .await;
        }

        self.accept_offer(peer_id, &offer, None)?;
        info!(
            peer = peer_id,
            transfer = %offer.transfer_id,
            size = offer.size_bytes,
            filename = %offer.filename,
            "transfer accepted"
        );
        let accept = FileAcceptPayload {
            transfer_id: offer.transfer_id.clone(),
            chunk_size_bytes: self.limits.chunk_size_bytes,
            max_inflight_chunks: self.limits.max_inflight_chunks,
            save_hint: None,
        };
        sink.send_envelope(Envelope::from_payload(MessageType::FileAccept, &accept)?)
            .await
    }

    /// Construct and track the incoming transfer for an admitted offer.
    ///
    /// `done_tx`, when given, is signaled with the terminal ack — this is
    /// how a pull requester learns its transfer finished.
    pub fn accept_offer(
        &self,
        peer_id: &str,
        offer: &FileOfferPayload,
        done_tx: Option<oneshot::Sender<FileAckPayload>>,
    ) -> crate::Result<FileAcceptPayload> {
        self.admit_offer(offer)?;
        let transfer = IncomingTransfer::begin(&self.root, peer_id, offer, done_tx)?;
        self.incoming
            .lock()
            .expect("incoming lock poisoned")
            .insert((peer_id.to_string(), offer.transfer_id.clone()), transfer);
        Ok(FileAcceptPayload {
            transfer_id: offer.transfer_id.clone(),
            chunk_size_bytes: self.limits.chunk_size_bytes,
            max_inflight_chunks: self.limits.max_inflight_chunks,
            save_hint: None,
        })
    }

    fn admit_offer(&self, offer: &FileOfferPayload) -> crate::Result<()> {
        if offer.transfer_id.trim().is_empty() {
            return Err(TransferError::UnknownTransfer("empty transfer_id".into()));
        }
        if offer.size_bytes > self.limits.max_file_bytes {
            return Err(TransferError::Oversize {
                size: offer.size_bytes,
                limit: self.limits.max_file_bytes,
            });
        }
        let used = self.inbox_usage_bytes();
        if used + offer.size_bytes > self.limits.max_total_bytes {
            return Err(TransferError::QuotaExceeded {
                used,
                limit: self.limits.max_total_bytes,
            });
        }
        Ok(())
    }

    /// Route one binary chunk frame to its transfer. Any violation fails the
    /// transfer, removes the partial file, and acks `failed`.
    pub async fn handle_chunk<S: WireSender + ?Sized>(
        &self,
        peer_id: &str,
        frame: &[u8],
        sink: &S,
    ) -> anyhow::Result<()> {
        let (header, bytes) = match decode_chunk(frame) {
            Ok(parts) => parts,
            Err(e) => {
                // Unattributable frame: nothing to fail, nothing to ack.
                warn!(peer = peer_id, "undecodable chunk frame: {e}");
                return Ok(());
            }
        };

        enum ChunkOutcome {
            Unknown,
            Applied,
            Failed(FileAckPayload),
        }

        let outcome = {
            let mut map = self.incoming.lock().expect("incoming lock poisoned");
            let key = (peer_id.to_string(), header.transfer_id.clone());
            let failed = match map.get_mut(&key) {
                None => None,
                Some(t) => match t.apply_chunk(&header, bytes) {
                    Ok(()) => Some(None),
                    Err(e) => {
                        let ack = t.fail(&e.to_string());
                        t.notify_done(&ack);
                        Some(Some(ack))
                    }
                },
            };
            match failed {
                None => ChunkOutcome::Unknown,
                Some(None) => ChunkOutcome::Applied,
                Some(Some(ack)) => {
                    map.remove(&key);
                    ChunkOutcome::Failed(ack)
                }
            }
        };

        match outcome {
            ChunkOutcome::Unknown => {
                debug!(peer = peer_id, transfer = %header.transfer_id, "chunk for unknown transfer");
                Ok(())
            }
            ChunkOutcome::Applied => Ok(()),
            ChunkOutcome::Failed(ack) => {
                warn!(peer = peer_id, transfer = %ack.transfer_id, error = ?ack.error, "transfer failed");
                sink.send_envelope(Envelope::from_payload(MessageType::FileAck, &ack)?)
                    .await
            }
        }
    }

    /// Handle `file.complete`: verify totals and hash, land the file, ack.
    pub async fn handle_complete<S: WireSender + ?Sized>(
        &self,
        peer_id: &str,
        complete: FileCompletePayload,
        sink: &S,
    ) -> anyhow::Result<()> {
        let key = (peer_id.to_string(), complete.transfer_id.clone());
        let ack = {
            let mut map = self.incoming.lock().expect("incoming lock poisoned");
            match map.remove(&key) {
                None => FileAckPayload {
                    transfer_id: complete.transfer_id.clone(),
                    status: TransferStatus::Failed,
                    size_bytes: None,
                    bytes_received: None,
                    saved_path: None,
                    sha256: None,
                    error: Some("unknown transfer".into()),
                },
                Some(mut t) => {
                    let ack = match t.finalize(&complete) {
                        Ok(ack) => ack,
                        Err(e) => t.fail(&e.to_string()),
                    };
                    t.notify_done(&ack);
                    ack
                }
            }
        };

        if ack.status == TransferStatus::Completed {
            info!(peer = peer_id, transfer = %ack.transfer_id, saved = ?ack.saved_path, "transfer completed");
        } else {
            warn!(peer = peer_id, transfer = %ack.transfer_id, error = ?ack.error, "transfer failed at completion");
        }
        sink.send_envelope(Envelope::from_payload(MessageType::FileAck, &ack)?)
            .await
    }

    /// Handle `file.cancel` from the sending side.
    pub async fn handle_cancel<S: WireSender + ?Sized>(
        &self,
        peer_id: &str,
        cancel: FileCancelPayload,
        sink: &S,
    ) -> anyhow::Result<()> {
        let key = (peer_id.to_string(), cancel.transfer_id.clone());
        let ack = {
            let mut map = self.incoming.lock().expect("incoming lock poisoned");
            map.remove(&key).map(|mut t| {
                let ack = t.fail("canceled by peer");
                t.notify_done(&ack);
                ack
            })
        };
        if let Some(ack) = ack {
            info!(peer = peer_id, transfer = %ack.transfer_id, "transfer canceled");
            sink.send_envelope(Envelope::from_payload(MessageType::FileAck, &ack)?)
                .await?;
        }
        Ok(())
    }

    /// Abort one transfer, signaling its completion channel.
    pub fn abort_transfer(&self, peer_id: &str, transfer_id: &str, reason: &str) {
        let mut map = self.incoming.lock().expect("incoming lock poisoned");
        if let Some(mut t) = map.remove(&(peer_id.to_string(), transfer_id.to_string())) {
            let ack = t.fail(reason);
            t.notify_done(&ack);
            warn!(peer = peer_id, transfer = transfer_id, "transfer aborted: {reason}");
        }
    }

    /// Sweep every live transfer for a disconnected peer. Each one fails and
    /// its completion channel is signaled.
    pub fn abort_peer(&self, peer_id: &str, reason: &str) {
        let mut map = self.incoming.lock().expect("incoming lock poisoned");
        let keys: Vec<_> = map
            .keys()
            .filter(|(p, _)| p == peer_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(mut t) = map.remove(&key) {
                let ack = t.fail(reason);
                t.notify_done(&ack);
                warn!(peer = peer_id, transfer = %key.1, "transfer aborted: {reason}");
            }
        }
    }

    /// Number of transfers currently in flight (diagnostics/tests).
    pub fn inflight_count(&self) -> usize {
        self.incoming.lock().expect("incoming lock poisoned").len()
    }

    // ── Housekeeping ──────────────────────────────────────────────────────────

    /// Total bytes currently stored under `inbox/`.
    pub fn inbox_usage_bytes(&self) -> u64 {
        walkdir::WalkDir::new(self.root.join("inbox"))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    /// Delete inbox date directories older than `retention_days`.
    /// Returns the number of directories removed.
    pub fn sweep_retention(&self) -> crate::Result<usize> {
        let cutoff = Utc::now().date_naive() - chrono::Days::new(self.limits.retention_days as u64);
        let inbox = self.root.join("inbox");
        let mut removed = 0;

        for peer in std::fs::read_dir(&inbox)? {
            let peer = peer?;
            if !peer.file_type()?.is_dir() {
                continue;
            }
            for day in std::fs::read_dir(peer.path())? {
                let day = day?;
                let name = day.file_name().to_string_lossy().to_string();
                let Ok(date) = NaiveDate::parse_from_str(&name, "%Y-%m-%d") else {
                    continue;
                };
                if date < cutoff {
                    std::fs::remove_dir_all(day.path())?;
                    removed += 1;
                    info!(dir = %day.path().display(), "retention sweep removed expired inbox day");
                }
            }
        }
        Ok(removed)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
