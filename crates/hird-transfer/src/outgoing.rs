// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Initiator-side flows: push a local file to the peer, or pull a remote
//! file into the local root.
//!
//! Both flows park on a per-transfer reply channel registered with the
//! engine; the connection reader routes accept/reject/ack (and, for pulls,
//! the peer's offer) to it by `transfer_id`. Dropping the future — e.g.
//! when the caller's context is canceled — deregisters the channel via a
//! guard, so an abandoned transfer leaves no matcher entry behind.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use hird_proto::payload::{
    FileAcceptPayload, FileAckPayload, FileCompletePayload, FileOfferPayload, FilePullPayload,
    FileRejectPayload, TransferStatus,
};
use hird_proto::{encode_chunk, ChunkHeader, Envelope, MessageType};

use crate::engine::{TransferEngine, WireSender};
use crate::paths::safe_join;
use crate::TransferError;

/// How long a pull requester waits for the peer's answering offer.
const PULL_OFFER_DEADLINE: Duration = Duration::from_secs(30);

/// Deregisters the reply channel when the flow ends — normally or by drop.
struct ReplyGuard<'a> {
    engine: &'a TransferEngine,
    transfer_id: String,
}

impl Drop for ReplyGuard<'_> {
    fn drop(&mut self) {
        self.engine.deregister_reply(&self.transfer_id);
    }
}

// ── Push ──────────────────────────────────────────────────────────────────────

/// Push `local_path` to the peer behind `sink`. Returns the peer's final ack.
pub async fn push_file<S: WireSender + ?Sized>(
    engine: &TransferEngine,
    sink: &S,
    local_path: &Path,
    timeout: Duration,
) -> crate::Result<FileAckPayload> {
    push_with_id(engine, sink, local_path, Uuid::new_v4().to_string(), timeout).await
}

/// Answer a `file.pull`: resolve the requested path under our root and push
/// it back using the requester's transfer id.
pub async fn serve_pull<S: WireSender + ?Sized>(
    engine: &TransferEngine,
    sink: &S,
    pull: &FilePullPayload,
    timeout: Duration,
) -> crate::Result<FileAckPayload> {
    let path = safe_join(engine.root(), &pull.remote_path)?;
    push_with_id(engine, sink, &path, pull.transfer_id.clone(), timeout).await
}

async fn push_with_id<S: WireSender + ?Sized>(
    engine: &TransferEngine,
    sink: &S,
    local_path: &Path,
    transfer_id: String,
    timeout: Duration,
) -> crate::Result<FileAckPayload> {
    let meta = std::fs::metadata(local_path)?;
    if !meta.is_file() {
        return Err(TransferError::NotAFile(local_path.to_path_buf()));
    }
    let size = meta.len();
    let filename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    let mut rx = engine.register_reply(&transfer_id);
    let _guard = ReplyGuard {
        engine,
        transfer_id: transfer_id.clone(),
    };
    let deadline = Instant::now() + timeout;

    let offer = FileOfferPayload {
        transfer_id: transfer_id.clone(),
        direction: Some("push".into()),
        filename,
        size_bytes: size,
        ..Default::default()
    };
    sink.send_envelope(Envelope::from_payload(MessageType::FileOffer, &offer)?)
        .await
        .map_err(|e| TransferError::Wire(e.to_string()))?;

    // Wait for the receiver's verdict.
    let accept = loop {
        let env = recv_reply(&mut rx, deadline).await?;
        match env.message_type() {
            MessageType::FileAccept => break env.parse_payload::<FileAcceptPayload>()?,
            MessageType::FileReject => {
                let reject: FileRejectPayload = env.parse_payload()?;
                return Err(TransferError::Rejected(
                    reject.reason.unwrap_or_else(|| "no reason given".into()),
                ));
            }
            other => debug!(transfer = %transfer_id, kind = %other, "unexpected reply, ignoring"),
        }
    };

    let chunk_size = if accept.chunk_size_bytes > 0 {
        accept.chunk_size_bytes as usize
    } else {
        engine.limits().chunk_size_bytes as usize
    };

    // Stream the file in order, hashing as we go.
    let mut file = std::fs::File::open(local_path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size];
    let mut offset = 0u64;
    let mut seq = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let header = ChunkHeader {
            transfer_id: transfer_id.clone(),
            seq,
            offset,
            len: n as u64,
        };
        hasher.update(&buf[..n]);
        sink.send_binary(encode_chunk(&header, &buf[..n])?)
            .await
            .map_err(|e| TransferError::Wire(e.to_string()))?;
        offset += n as u64;
        seq += 1;
    }

    let sha256 = hex::encode(hasher.finalize());
    let complete = FileCompletePayload {
        transfer_id: transfer_id.clone(),
        size_bytes: Some(offset),
        sha256: Some(sha256),
    };
    sink.send_envelope(Envelope::from_payload(MessageType::FileComplete, &complete)?)
        .await
        .map_err(|e| TransferError::Wire(e.to_string()))?;

    // Wait for the receiver's final ack.
    loop {
        let env = recv_reply(&mut rx, deadline).await?;
        if env.message_type() != MessageType::FileAck {
            continue;
        }
        let ack: FileAckPayload = env.parse_payload()?;
        info!(transfer = %transfer_id, status = ?ack.status, "push finished");
        return Ok(ack);
    }
}

// ── Pull ──────────────────────────────────────────────────────────────────────

/// Pull `remote_path` from the peer behind `sink` into the local root.
///
/// Returns the absolute local path of the received file once the transfer
/// acked `completed`.
pub async fn pull_file<S: WireSender + ?Sized>(
    engine: &TransferEngine,
    sink: &S,
    peer_id: &str,
    remote_path: &str,
    timeout: Duration,
) -> crate::Result<PathBuf> {
    let transfer_id = Uuid::new_v4().to_string();
    let mut rx = engine.register_reply(&transfer_id);
    let _guard = ReplyGuard {
        engine,
        transfer_id: transfer_id.clone(),
    };
    let deadline = Instant::now() + timeout;

    let pull = FilePullPayload {
        transfer_id: transfer_id.clone(),
        remote_path: remote_path.to_string(),
    };
    sink.send_envelope(Envelope::from_payload(MessageType::FilePull, &pull)?)
        .await
        .map_err(|e| TransferError::Wire(e.to_string()))?;

    // The peer answers with a push-style offer for our transfer id.
    let offer_deadline = Instant::now() + PULL_OFFER_DEADLINE.min(timeout);
    let offer = loop {
        let env = recv_reply(&mut rx, offer_deadline.min(deadline)).await?;
        match env.message_type() {
            MessageType::FileOffer => {
                let offer: FileOfferPayload = env.parse_payload()?;
                if offer.transfer_id == transfer_id {
                    break offer;
                }
                debug!(transfer = %transfer_id, "offer for different transfer, ignoring");
            }
            MessageType::FileReject => {
                let reject: FileRejectPayload = env.parse_payload()?;
                return Err(TransferError::Rejected(
                    reject.reason.unwrap_or_else(|| "pull refused".into()),
                ));
            }
            other => debug!(transfer = %transfer_id, kind = %other, "unexpected reply, ignoring"),
        }
    };

    // Track the incoming transfer with a completion waiter, then accept.
    let (done_tx, done_rx) = oneshot::channel();
    let accept = engine.accept_offer(peer_id, &offer, Some(done_tx))?;
    sink.send_envelope(Envelope::from_payload(MessageType::FileAccept, &accept)?)
        .await
        .map_err(|e| TransferError::Wire(e.to_string()))?;

    // Chunks and completion flow through the connection reader into the
    // engine; we just wait for the terminal ack.
    let ack = match timeout_at(deadline, done_rx).await {
        Err(_) => {
            engine.abort_transfer(peer_id, &transfer_id, "pull timed out");
            return Err(TransferError::Timeout);
        }
        Ok(Err(_)) => return Err(TransferError::Aborted("transfer dropped".into())),
        Ok(Ok(ack)) => ack,
    };

    match ack.status {
        TransferStatus::Completed => {
            let rel = ack
                .saved_path
                .ok_or_else(|| TransferError::Aborted("completed ack without saved_path".into()))?;
            Ok(engine.root().join(rel))
        }
        _ => Err(TransferError::Aborted(
            ack.error.unwrap_or_else(|| "transfer failed".into()),
        )),
    }
}

async fn recv_reply(
    rx: &mut mpsc::Receiver<Envelope>,
    deadline: Instant,
) -> crate::Result<Envelope> {
    match timeout_at(deadline, rx.recv()).await {
        Err(_) => Err(TransferError::Timeout),
        Ok(None) => Err(TransferError::Aborted("reply channel closed".into())),
        Ok(Some(env)) => Ok(env),
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TransferLimits;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Sink that feeds everything it "sends" into a receiver engine, acting
    /// as a zero-latency loopback wire between two engines.
    struct LoopbackSink {
        /// Receiving side of the wire.
        remote: Arc<TransferEngine>,
        /// Sink the *remote* uses to answer back (routes into our replies).
        backchannel: Arc<ReplySink>,
        peer_id: String,
    }

    /// Routes the remote's answers back into the initiator's reply channels.
    struct ReplySink {
        local: Arc<TransferEngine>,
    }

    #[async_trait]
    impl WireSender for ReplySink {
        async fn send_envelope(&self, env: Envelope) -> anyhow::Result<()> {
            let tid = env
                .payload
                .get("transfer_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            self.local.deliver_reply(&tid, env);
            Ok(())
        }
        async fn send_binary(&self, _frame: Vec<u8>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl WireSender for LoopbackSink {
        async fn send_envelope(&self, env: Envelope) -> anyhow::Result<()> {
            match env.message_type() {
                MessageType::FileOffer => {
                    let offer = env.parse_payload().unwrap();
                    self.remote
                        .handle_offer(&self.peer_id, offer, self.backchannel.as_ref())
                        .await
                }
                MessageType::FileComplete => {
                    let complete = env.parse_payload().unwrap();
                    self.remote
                        .handle_complete(&self.peer_id, complete, self.backchannel.as_ref())
                        .await
                }
                MessageType::FileCancel => {
                    let cancel = env.parse_payload().unwrap();
                    self.remote
                        .handle_cancel(&self.peer_id, cancel, self.backchannel.as_ref())
                        .await
                }
                _ => Ok(()),
            }
        }
        async fn send_binary(&self, frame: Vec<u8>) -> anyhow::Result<()> {
            self.remote
                .handle_chunk(&self.peer_id, &frame, self.backchannel.as_ref())
                .await
        }
    }

    fn wire(
        local_dir: &Path,
        remote_dir: &Path,
    ) -> (Arc<TransferEngine>, Arc<TransferEngine>, LoopbackSink) {
        let local = Arc::new(TransferEngine::new(local_dir, TransferLimits::default()).unwrap());
        let remote = Arc::new(TransferEngine::new(remote_dir, TransferLimits::default()).unwrap());
        let sink = LoopbackSink {
            remote: remote.clone(),
            backchannel: Arc::new(ReplySink {
                local: local.clone(),
            }),
            peer_id: "initiator".into(),
        };
        (local, remote, sink)
    }

    #[tokio::test]
    async fn push_delivers_file_with_matching_hash() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let (local, _remote, sink) = wire(local_dir.path(), remote_dir.path());

        let src = local_dir.path().join("outbox/report.bin");
        let body: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &body).unwrap();

        let ack = push_file(&local, &sink, &src, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ack.status, TransferStatus::Completed);
        assert_eq!(ack.bytes_received, Some(body.len() as u64));

        let saved = remote_dir.path().join(ack.saved_path.unwrap());
        assert_eq!(std::fs::read(saved).unwrap(), body);
        assert_eq!(
            ack.sha256.unwrap(),
            hex::encode(Sha256::digest(&body)),
            "receiver hash must match sender bytes"
        );
        // Reply channel cleaned up on exit.
        assert!(!local.has_reply_waiter(&ack.transfer_id));
    }

    #[tokio::test]
    async fn push_of_missing_file_fails_locally() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let (local, _remote, sink) = wire(local_dir.path(), remote_dir.path());

        let err = push_file(
            &local,
            &sink,
            &local_dir.path().join("nope.bin"),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[tokio::test]
    async fn push_of_directory_is_not_a_file() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let (local, _remote, sink) = wire(local_dir.path(), remote_dir.path());

        let err = push_file(
            &local,
            &sink,
            &local_dir.path().join("outbox"),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::NotAFile(_)));
    }

    #[tokio::test]
    async fn oversized_push_is_rejected_by_receiver() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let local =
            Arc::new(TransferEngine::new(local_dir.path(), TransferLimits::default()).unwrap());
        let remote = Arc::new(
            TransferEngine::new(
                remote_dir.path(),
                TransferLimits {
                    max_file_bytes: 16,
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let sink = LoopbackSink {
            remote,
            backchannel: Arc::new(ReplySink {
                local: local.clone(),
            }),
            peer_id: "initiator".into(),
        };

        let src = local_dir.path().join("outbox/big.bin");
        std::fs::write(&src, vec![0u8; 64]).unwrap();

        let err = push_file(&local, &sink, &src, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Rejected(_)));
    }

    #[tokio::test]
    async fn serve_pull_refuses_escaping_paths() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let (local, _remote, sink) = wire(local_dir.path(), remote_dir.path());

        let pull = FilePullPayload {
            transfer_id: "t1".into(),
            remote_path: "../../etc/shadow".into(),
        };
        let err = serve_pull(&local, &sink, &pull, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::PathEscape(_)));
    }

    #[tokio::test]
    async fn push_times_out_when_nobody_answers() {
        let local_dir = tempfile::tempdir().unwrap();
        let local =
            Arc::new(TransferEngine::new(local_dir.path(), TransferLimits::default()).unwrap());

        /// A sink that swallows everything.
        struct NullSink;
        #[async_trait]
        impl WireSender for NullSink {
            async fn send_envelope(&self, _env: Envelope) -> anyhow::Result<()> {
                Ok(())
            }
            async fn send_binary(&self, _frame: Vec<u8>) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let src = local_dir.path().join("outbox/x.bin");
        std::fs::write(&src, b"data").unwrap();

        let err = push_file(&local, &NullSink, &src, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Timeout));
    }

    #[tokio::test]
    async fn concurrent_pushes_do_not_cross_reply_channels() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let (local, _remote, sink) = wire(local_dir.path(), remote_dir.path());
        let sink = Arc::new(sink);

        let mut handles = Vec::new();
        for i in 0..4 {
            let src = local_dir.path().join(format!("outbox/f{i}.bin"));
            std::fs::write(&src, vec![i as u8; 4096]).unwrap();
            let local = local.clone();
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                push_file(&local, sink.as_ref(), &src, Duration::from_secs(5)).await
            }));
        }
        for h in handles {
            let ack = h.await.unwrap().unwrap();
            assert_eq!(ack.status, TransferStatus::Completed);
        }
    }
}
