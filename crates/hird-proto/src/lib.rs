// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire protocol between the hird master and its slave nodes.
//!
//! All frames are JSON text envelopes ([`Envelope`]) **except** file chunks,
//! which are binary ([`chunk`]). Payloads are typed per message kind in
//! [`payload`] and carried opaquely inside the envelope.

pub mod chunk;
pub mod envelope;
pub mod payload;

pub use chunk::{decode_chunk, encode_chunk, ChunkHeader};
pub use envelope::{Envelope, MessageType, ProtoError, PROTOCOL_VERSION};

/// Shorthand result type for codec operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
