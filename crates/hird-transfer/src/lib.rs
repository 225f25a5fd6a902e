// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Chunked file transfer between cluster peers.
//!
//! # Lifecycle
//!
//! ```text
//! Offered ──accept──▶ Receiving ──bytes==size──▶ Finalizing ──hash ok──▶ Completed
//!    │                    │                            │
//!    └──reject──▶ Failed   └──size/hash fail──▶ Failed  └──rename fail──▶ Failed
//! ```
//!
//! Text envelopes carry the offer/accept/reject/complete/ack lifecycle;
//! the bytes themselves travel as binary chunk frames (see
//! [`hird_proto::chunk`]). Chunks are strictly sequential — the receiver
//! requires `offset == next_offset` and keeps no reorder buffer.
//!
//! # Disk layout
//!
//! ```text
//! root_dir/
//!   inbox/<peer>/<YYYY-MM-DD>/<transfer_id>__<filename>
//!   inbox/<peer>/<YYYY-MM-DD>/<transfer_id>.manifest.json
//!   outbox/
//!   tmp/<transfer_id>.partial
//! ```
//!
//! Every path is produced by [`paths::safe_join`]; a peer cannot name a
//! destination outside `root_dir` no matter what it sends.

mod engine;
mod error;
mod incoming;
mod manifest;
mod outgoing;
pub mod paths;

pub use engine::{TransferEngine, TransferLimits, WireSender};
pub use error::TransferError;
pub use manifest::TransferManifest;
pub use outgoing::{pull_file, push_file, serve_pull};

/// Shorthand result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
