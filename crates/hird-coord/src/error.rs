// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not acquire lock on {0} within the wait budget")]
    LockTimeout(PathBuf),

    #[error("invalid identifier: {0:?}")]
    InvalidId(String),

    #[error("invalid agent spec: {0}")]
    InvalidSpec(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out waiting for signal")]
    WaitTimeout,

    #[error("wait canceled")]
    Canceled,

    #[error("archive dir {0} must live outside the run root")]
    ArchiveInsideRoot(PathBuf),

    #[error("no free archive destination for run {0} after {1} attempts")]
    ArchiveCollision(String, u32),
}

/// Errors surfaced by the in-child worker controller.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A `cancel` command (or context cancellation) ended the run. The worker
    /// unwinds its top-level loop when it sees this.
    #[error("agent canceled")]
    Canceled,

    #[error(transparent)]
    Store(#[from] StoreError),
}
