// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The typed, versioned outer message carried on every text frame.
//!
//! # Wire format
//!
//! ```json
//! {"type": "agent.run", "id": "…", "ts": 1735689600,
//!  "protocol_version": 1, "payload": {…}}
//! ```
//!
//! The `id` is a correlation id: replies (`register_ack`, `agent.result`,
//! `heartbeat_ack`) echo the id of the envelope they answer. Payloads are
//! opaque at this layer — see [`crate::payload`] for the typed shapes.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The only defined protocol version. Receivers coerce zero to this value;
/// an explicit higher version is passed through for the caller to judge.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("invalid chunk frame: {0}")]
    InvalidChunk(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Message kinds ─────────────────────────────────────────────────────────────

/// Every message kind the cluster speaks. The envelope stores the raw string
/// so unknown kinds from newer peers survive decode; dispatch goes through
/// [`Envelope::message_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Register,
    RegisterAck,
    Heartbeat,
    HeartbeatAck,
    AgentRun,
    AgentResult,
    FileOffer,
    FileAccept,
    FileReject,
    FileComplete,
    FileAck,
    FilePull,
    FileCancel,
    /// A kind this build does not know. Reader loops log and skip these.
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Register => "register",
            MessageType::RegisterAck => "register_ack",
            MessageType::Heartbeat => "heartbeat",
            MessageType::HeartbeatAck => "heartbeat_ack",
            MessageType::AgentRun => "agent.run",
            MessageType::AgentResult => "agent.result",
            MessageType::FileOffer => "file.offer",
            MessageType::FileAccept => "file.accept",
            MessageType::FileReject => "file.reject",
            MessageType::FileComplete => "file.complete",
            MessageType::FileAck => "file.ack",
            MessageType::FilePull => "file.pull",
            MessageType::FileCancel => "file.cancel",
            MessageType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> MessageType {
        match s {
            "register" => MessageType::Register,
            "register_ack" => MessageType::RegisterAck,
            "heartbeat" => MessageType::Heartbeat,
            "heartbeat_ack" => MessageType::HeartbeatAck,
            "agent.run" => MessageType::AgentRun,
            "agent.result" => MessageType::AgentResult,
            "file.offer" => MessageType::FileOffer,
            "file.accept" => MessageType::FileAccept,
            "file.reject" => MessageType::FileReject,
            "file.complete" => MessageType::FileComplete,
            "file.ack" => MessageType::FileAck,
            "file.pull" => MessageType::FilePull,
            "file.cancel" => MessageType::FileCancel,
            _ => MessageType::Unknown,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The outer message on every text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind string, e.g. `"register"` or `"file.offer"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Unique correlation id. Auto-generated when not supplied.
    pub id: String,

    /// Unix seconds, UTC, stamped at construction.
    pub ts: i64,

    /// Always [`PROTOCOL_VERSION`] for envelopes this build creates.
    pub protocol_version: u32,

    /// Opaque nested payload object — typed per kind in [`crate::payload`].
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build an envelope with a fresh id and a now-UTC timestamp.
    pub fn new(kind: MessageType, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            id: Uuid::new_v4().to_string(),
            ts: Utc::now().timestamp(),
            protocol_version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Build an envelope with a caller-supplied correlation id (used for
    /// replies, which echo the id of the request they answer).
    pub fn with_id(kind: MessageType, id: impl Into<String>, payload: serde_json::Value) -> Self {
        let mut env = Self::new(kind, payload);
        env.id = id.into();
        env
    }

    /// Build an envelope whose payload is a serializable struct.
    pub fn from_payload<T: Serialize>(kind: MessageType, payload: &T) -> crate::Result<Self> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Reply envelope: same kind semantics as [`Envelope::from_payload`] but
    /// echoing `reply_to` as the correlation id.
    pub fn reply_to<T: Serialize>(
        kind: MessageType,
        reply_to: &str,
        payload: &T,
    ) -> crate::Result<Self> {
        Ok(Self::with_id(kind, reply_to, serde_json::to_value(payload)?))
    }

    /// The parsed message kind. Unrecognized strings map to
    /// [`MessageType::Unknown`].
    pub fn message_type(&self) -> MessageType {
        MessageType::parse(&self.kind)
    }

    /// Deserialize the payload into its typed shape.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Serialize to the JSON text-frame form.
    pub fn marshal(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and normalize an envelope from a text frame.
    ///
    /// Trims `type` and `id`; both must be non-empty afterwards. A zero
    /// `protocol_version` is coerced to [`PROTOCOL_VERSION`].
    pub fn unmarshal(text: &str) -> crate::Result<Envelope> {
        let mut env: Envelope = serde_json::from_str(text)?;
        env.kind = env.kind.trim().to_string();
        env.id = env.id.trim().to_string();
        if env.kind.is_empty() {
            return Err(ProtoError::InvalidEnvelope("empty type".into()));
        }
        if env.id.is_empty() {
            return Err(ProtoError::InvalidEnvelope("empty id".into()));
        }
        if env.protocol_version == 0 {
            env.protocol_version = PROTOCOL_VERSION;
        }
        Ok(env)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
