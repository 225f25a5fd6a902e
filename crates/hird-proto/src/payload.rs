// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Typed payload shapes for every message kind.
//!
//! These mirror the wire tables one-to-one. Optional fields are omitted from
//! the JSON when absent so frames stay small and forward-compatible.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Registration ──────────────────────────────────────────────────────────────

/// Authentication block inside `register`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    /// Unix seconds at signing time. Must be within the master's clock skew.
    pub ts: i64,
    /// Single-use random nonce.
    pub nonce: String,
    /// Lowercase hex HMAC-SHA256 of `slave_id\n ts\n nonce` (no spaces).
    pub sig: String,
}

/// `register` — the mandatory first message on every slave connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub slave_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    pub auth: AuthPayload,
}

/// `register_ack` — master's verdict on a registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterAckPayload {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_instance_id: Option<String>,
}

// ── Heartbeats ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatAckPayload {
    pub server_time_unix: i64,
}

// ── Remote task execution ─────────────────────────────────────────────────────

/// Options attached to an `agent.run` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// `agent.run` — master → slave task dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunPayload {
    pub task: String,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Terminal status of a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    /// The slave's inflight capacity was exhausted; the task was not started.
    Busy,
}

/// `agent.result` — slave → master reply; the envelope id matches the
/// originating `agent.run` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResultPayload {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

// ── File transfer ─────────────────────────────────────────────────────────────

/// `file.offer` — announces an intent to send a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileOfferPayload {
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    pub filename: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// `file.accept` — receiver's go-ahead with negotiated parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAcceptPayload {
    pub transfer_id: String,
    pub chunk_size_bytes: u64,
    pub max_inflight_chunks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRejectPayload {
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `file.complete` — sender's end-of-stream marker with final totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCompletePayload {
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Receiver-side status reported in `file.ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Accepted,
    InProgress,
    Completed,
    Failed,
}

/// `file.ack` — receiver → sender final (or progress) verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAckPayload {
    pub transfer_id: String,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    /// Path relative to the receiver's file root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `file.pull` — requester asks the peer to push `remote_path` back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilePullPayload {
    pub transfer_id: String,
    pub remote_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCancelPayload {
    pub transfer_id: String,
}

// ── Unit tests ────────────────────────────────────────────────────────────────
