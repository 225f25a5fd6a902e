// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Receiver-side state for one inbound transfer.
//!
//! Bytes stream into `tmp/<transfer_id>.partial` while a running SHA-256 is
//! maintained; only after the declared size and hash check out is the file
//! renamed to its final inbox path and the manifest written. A failure at
//! any stage removes the partial file — the inbox never contains a file
//! that did not verify.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::debug;

use hird_proto::payload::{FileAckPayload, FileCompletePayload, FileOfferPayload, TransferStatus};
use hird_proto::ChunkHeader;

use crate::manifest::TransferManifest;
use crate::paths::sanitize_filename;
use crate::TransferError;

/// One inbound transfer in flight.
pub struct IncomingTransfer {
    pub transfer_id: String,
    pub peer_id: String,
    pub filename: String,
    pub declared_size: u64,
    pub declared_sha256: Option<String>,
    pub bytes_seen: u64,
    pub next_offset: u64,
    pub closed: bool,

    file: Option<std::fs::File>,
    hasher: Sha256,
    tmp_path: PathBuf,
    /// Final destination, relative to the transfer root.
    rel_path: String,
    abs_path: PathBuf,
    manifest_path: PathBuf,
    metadata: Option<HashMap<String, serde_json::Value>>,

    /// Signaled with the final ack when the transfer reaches a terminal
    /// state. Present only for pull-initiated transfers with a local waiter.
    done_tx: Option<oneshot::Sender<FileAckPayload>>,
}

impl IncomingTransfer {
    /// Open the partial file and lay out destination paths for an offer.
    pub fn begin(
        root: &Path,
        peer_id: &str,
        offer: &FileOfferPayload,
        done_tx: Option<oneshot::Sender<FileAckPayload>>,
    ) -> crate::Result<Self> {
        let filename = sanitize_filename(&offer.filename);
        let peer_dir = sanitize_filename(peer_id);
        let date = Utc::now().format("%Y-%m-%d").to_string();

        let rel_path = format!(
            "inbox/{peer_dir}/{date}/{}__{filename}",
            offer.transfer_id
        );
        let abs_path = root.join(&rel_path);
        let manifest_path = root
            .join("inbox")
            .join(&peer_dir)
            .join(&date)
            .join(format!("{}.manifest.json", offer.transfer_id));
        let tmp_path = root
            .join("tmp")
            .join(format!("{}.partial", sanitize_filename(&offer.transfer_id)));

        if let Some(parent) = tmp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            transfer_id: offer.transfer_id.clone(),
            peer_id: peer_id.to_string(),
            filename,
            declared_size: offer.size_bytes,
            declared_sha256: offer.sha256.as_ref().map(|h| h.to_lowercase()),
            bytes_seen: 0,
            next_offset: 0,
            closed: false,
            file: Some(file),
            hasher: Sha256::new(),
            tmp_path,
            rel_path,
            abs_path,
            manifest_path,
            metadata: offer.metadata.clone(),
            done_tx,
        })
    }

    /// Apply one chunk: strict offset and length discipline, then write+hash.
    pub fn apply_chunk(&mut self, header: &ChunkHeader, bytes: &[u8]) -> crate::Result<()> {
        if self.closed {
            return Err(TransferError::Aborted("transfer already closed".into()));
        }
        if header.offset != self.next_offset {
            return Err(TransferError::OffsetGap {
                expected: self.next_offset,
                got: header.offset,
            });
        }
        if header.len != bytes.len() as u64 {
            return Err(TransferError::LengthMismatch {
                declared: header.len,
                got: bytes.len() as u64,
            });
        }
        if self.bytes_seen + header.len > self.declared_size {
            return Err(TransferError::SizeMismatch {
                expected: self.declared_size,
                got: self.bytes_seen + header.len,
            });
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| TransferError::Aborted("no open file".into()))?;
        file.write_all(bytes)?;
        self.hasher.update(bytes);
        self.bytes_seen += header.len;
        self.next_offset += header.len;
        Ok(())
    }

    /// Finish the transfer: verify totals, rename into the inbox, write the
    /// manifest, and build the `completed` ack.
    pub fn finalize(&mut self, complete: &FileCompletePayload) -> crate::Result<FileAckPayload> {
        if self.bytes_seen != self.declared_size {
            return Err(TransferError::SizeMismatch {
                expected: self.declared_size,
                got: self.bytes_seen,
            });
        }
        if let Some(sender_size) = complete.size_bytes {
            if sender_size != self.bytes_seen {
                return Err(TransferError::SizeMismatch {
                    expected: sender_size,
                    got: self.bytes_seen,
                });
            }
        }

        let digest = hex::encode(std::mem::take(&mut self.hasher).finalize());
        let declared = complete
            .sha256
            .as_ref()
            .map(|h| h.to_lowercase())
            .or_else(|| self.declared_sha256.clone());
        if let Some(expected) = declared {
            if expected != digest {
                return Err(TransferError::HashMismatch {
                    expected,
                    got: digest,
                });
            }
        }

        // Flush and close before the rename so the destination is complete.
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        if let Some(parent) = self.abs_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&self.tmp_path, &self.abs_path)?;

        let manifest = TransferManifest {
            transfer_id: self.transfer_id.clone(),
            peer_id: self.peer_id.clone(),
            filename: self.filename.clone(),
            size_bytes: self.bytes_seen,
            sha256: digest.clone(),
            saved_path: self.rel_path.clone(),
            received_at: Utc::now().to_rfc3339(),
            metadata: self.metadata.clone(),
        };
        manifest.write(&self.manifest_path)?;

        self.closed = true;
        Ok(FileAckPayload {
            transfer_id: self.transfer_id.clone(),
            status: TransferStatus::Completed,
            size_bytes: Some(self.declared_size),
            bytes_received: Some(self.bytes_seen),
            saved_path: Some(self.rel_path.clone()),
            sha256: Some(digest),
            error: None,
        })
    }

    /// Terminal failure: close and remove the partial file, build the
    /// `failed` ack.
    pub fn fail(&mut self, err: &str) -> FileAckPayload {
        self.closed = true;
        self.file = None;
        if let Err(e) = std::fs::remove_file(&self.tmp_path) {
            debug!(transfer = %self.transfer_id, "partial cleanup: {e}");
        }
        FileAckPayload {
            transfer_id: self.transfer_id.clone(),
            status: TransferStatus::Failed,
            size_bytes: Some(self.declared_size),
            bytes_received: Some(self.bytes_seen),
            saved_path: None,
            sha256: None,
            error: Some(err.to_string()),
        }
    }

    /// Absolute path of the completed file.
    pub fn absolute_path(&self) -> &Path {
        &self.abs_path
    }

    /// Deliver the terminal ack to a local waiter, if one is attached.
    pub fn notify_done(&mut self, ack: &FileAckPayload) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(ack.clone());
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(id: &str, size: u64, sha256: Option<String>) -> FileOfferPayload {
        FileOfferPayload {
            transfer_id: id.into(),
            filename: "data.bin".into(),
            size_bytes: size,
            sha256,
            ..Default::default()
        }
    }

    fn chunk(id: &str, seq: u64, offset: u64, len: u64) -> ChunkHeader {
        ChunkHeader {
            transfer_id: id.into(),
            seq,
            offset,
            len,
        }
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[test]
    fn sequential_chunks_complete_and_land_in_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"hello world, hird".to_vec();
        let hash = sha256_hex(&body);

        let mut t = IncomingTransfer::begin(
            dir.path(),
            "s1",
            &offer("t1", body.len() as u64, Some(hash.clone())),
            None,
        )
        .unwrap();

        t.apply_chunk(&chunk("t1", 0, 0, 5), &body[..5]).unwrap();
        t.apply_chunk(&chunk("t1", 1, 5, (body.len() - 5) as u64), &body[5..])
            .unwrap();

        let ack = t
            .finalize(&FileCompletePayload {
                transfer_id: "t1".into(),
                size_bytes: Some(body.len() as u64),
                sha256: Some(hash.clone()),
            })
            .unwrap();

        assert_eq!(ack.status, TransferStatus::Completed);
        assert_eq!(ack.sha256.as_deref(), Some(hash.as_str()));
        let saved = dir.path().join(ack.saved_path.unwrap());
        assert_eq!(std::fs::read(&saved).unwrap(), body);
        // Manifest sits beside the file; partial is gone.
        assert!(saved.parent().unwrap().join("t1.manifest.json").exists());
        assert!(!dir.path().join("tmp/t1.partial").exists());
    }

    #[test]
    fn out_of_order_chunk_is_an_offset_gap() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = IncomingTransfer::begin(dir.path(), "s1", &offer("t1", 10, None), None).unwrap();
        t.apply_chunk(&chunk("t1", 0, 0, 4), b"aaaa").unwrap();
        let err = t.apply_chunk(&chunk("t1", 2, 8, 2), b"bb").unwrap_err();
        assert!(matches!(err, TransferError::OffsetGap { expected: 4, got: 8 }));
    }

    #[test]
    fn header_length_must_match_payload() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = IncomingTransfer::begin(dir.path(), "s1", &offer("t1", 10, None), None).unwrap();
        let err = t.apply_chunk(&chunk("t1", 0, 0, 4), b"aaaaa").unwrap_err();
        assert!(matches!(
            err,
            TransferError::LengthMismatch { declared: 4, got: 5 }
        ));
    }

    #[test]
    fn bytes_beyond_declared_size_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = IncomingTransfer::begin(dir.path(), "s1", &offer("t1", 4, None), None).unwrap();
        let err = t.apply_chunk(&chunk("t1", 0, 0, 5), b"aaaaa").unwrap_err();
        assert!(matches!(err, TransferError::SizeMismatch { .. }));
    }

    #[test]
    fn hash_mismatch_fails_and_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"real content".to_vec();
        let mut t = IncomingTransfer::begin(
            dir.path(),
            "s1",
            &offer("t1", body.len() as u64, Some(sha256_hex(b"other content"))),
            None,
        )
        .unwrap();
        t.apply_chunk(&chunk("t1", 0, 0, body.len() as u64), &body)
            .unwrap();
        let err = t
            .finalize(&FileCompletePayload {
                transfer_id: "t1".into(),
                size_bytes: None,
                sha256: None,
            })
            .unwrap_err();
        assert!(matches!(err, TransferError::HashMismatch { .. }));

        let ack = t.fail(&err.to_string());
        assert_eq!(ack.status, TransferStatus::Failed);
        assert!(!dir.path().join("tmp/t1.partial").exists());
        // Nothing landed in the inbox.
        assert!(!dir.path().join("inbox").exists() || walk_count(dir.path().join("inbox")) == 0);
    }

    #[test]
    fn short_transfer_fails_size_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = IncomingTransfer::begin(dir.path(), "s1", &offer("t1", 10, None), None).unwrap();
        t.apply_chunk(&chunk("t1", 0, 0, 4), b"aaaa").unwrap();
        let err = t
            .finalize(&FileCompletePayload {
                transfer_id: "t1".into(),
                size_bytes: None,
                sha256: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::SizeMismatch { expected: 10, got: 4 }
        ));
    }

    #[test]
    fn hostile_filename_is_sanitized_into_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = offer("t1", 2, None);
        o.filename = "../../etc/passwd".into();
        let mut t = IncomingTransfer::begin(dir.path(), "s1", &o, None).unwrap();
        t.apply_chunk(&chunk("t1", 0, 0, 2), b"ok").unwrap();
        let ack = t
            .finalize(&FileCompletePayload {
                transfer_id: "t1".into(),
                size_bytes: None,
                sha256: None,
            })
            .unwrap();
        let saved = ack.saved_path.unwrap();
        assert!(saved.ends_with("t1__passwd"), "got {saved}");
        assert!(dir.path().join(saved).exists());
    }

    #[test]
    fn uppercase_sender_hash_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"abc".to_vec();
        let mut t =
            IncomingTransfer::begin(dir.path(), "s1", &offer("t1", 3, None), None).unwrap();
        t.apply_chunk(&chunk("t1", 0, 0, 3), &body).unwrap();
        let ack = t
            .finalize(&FileCompletePayload {
                transfer_id: "t1".into(),
                size_bytes: Some(3),
                sha256: Some(sha256_hex(&body).to_uppercase()),
            })
            .unwrap();
        assert_eq!(ack.status, TransferStatus::Completed);
    }

    fn walk_count(root: PathBuf) -> usize {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }
}
