// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Deliberately opaque — the internal reason is logged, never sent.
    #[error("auth failed")]
    Auth,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("slave offline: {0}")]
    Offline(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("canceled")]
    Canceled,

    #[error("wire error: {0}")]
    Wire(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Proto(#[from] hird_proto::ProtoError),

    #[error(transparent)]
    Transfer(#[from] hird_transfer::TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
