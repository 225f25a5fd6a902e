// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Binary chunk frames for file transfer.
//!
//! # Frame layout
//!
//! ```text
//! <UTF-8 JSON header> 0x0A <raw bytes>
//! ```
//!
//! The header is a single-line JSON object; the first `\n` in the frame
//! terminates it. The header's `len` field declares the payload length —
//! the transfer engine compares it against the actual byte count and fails
//! the transfer on mismatch (the codec itself only splits the frame).

use serde::{Deserialize, Serialize};

use crate::envelope::ProtoError;

/// Header preceding the raw bytes of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    pub transfer_id: String,
    /// Chunk ordinal, starting at 0, incremented by one per chunk.
    pub seq: u64,
    /// Byte offset of this chunk within the file. Must equal the receiver's
    /// `next_offset` — chunks are strictly sequential, no reorder buffer.
    pub offset: u64,
    /// Declared payload length.
    pub len: u64,
}

/// Encode a chunk frame: header line, `\n`, raw bytes.
pub fn encode_chunk(header: &ChunkHeader, bytes: &[u8]) -> crate::Result<Vec<u8>> {
    let head = serde_json::to_vec(header)?;
    let mut frame = Vec::with_capacity(head.len() + 1 + bytes.len());
    frame.extend_from_slice(&head);
    frame.push(b'\n');
    frame.extend_from_slice(bytes);
    Ok(frame)
}

/// Split a binary frame into its header and payload.
///
/// The payload is returned as-is; length validation against `header.len` is
/// the engine's job so a mismatch can fail the right transfer.
pub fn decode_chunk(frame: &[u8]) -> crate::Result<(ChunkHeader, &[u8])> {
    let newline = frame
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| ProtoError::InvalidChunk("missing header terminator".into()))?;
    let header: ChunkHeader = serde_json::from_slice(&frame[..newline])
        .map_err(|e| ProtoError::InvalidChunk(format!("bad header: {e}")))?;
    if header.transfer_id.is_empty() {
        return Err(ProtoError::InvalidChunk("empty transfer_id".into()));
    }
    Ok((header, &frame[newline + 1..]))
}

// ── Unit tests ────────────────────────────────────────────────────────────────
