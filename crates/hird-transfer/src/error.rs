// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("chunk offset gap: expected {expected}, got {got}")]
    OffsetGap { expected: u64, got: u64 },

    #[error("chunk length mismatch: header says {declared}, frame carries {got}")]
    LengthMismatch { declared: u64, got: u64 },

    #[error("size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: u64, got: u64 },

    #[error("sha256 mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: String, got: String },

    #[error("file too large: {size} bytes (limit {limit})")]
    Oversize { size: u64, limit: u64 },

    #[error("inbox quota exceeded: {used} bytes used of {limit}")]
    QuotaExceeded { used: u64, limit: u64 },

    #[error("unsafe path: {0}")]
    PathEscape(String),

    #[error("unknown transfer: {0}")]
    UnknownTransfer(String),

    #[error("transfer rejected by peer: {0}")]
    Rejected(String),

    #[error("transfer timed out")]
    Timeout,

    #[error("transfer aborted: {0}")]
    Aborted(String),

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("wire error: {0}")]
    Wire(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] hird_proto::ProtoError),
}
