// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Agent spec and state — the two JSON documents describing one child agent.
//!
//! `spec.json` is written once at creation; `state.json` is rewritten
//! atomically on every transition. Two invariants hold for state writes:
//! `updated_at` never moves backwards for a given writer, and `finished_at`
//! is set exactly once — on the first write that makes the status terminal.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a child agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Canceled
        )
    }
}

/// `spec.json` — what the agent was asked to do. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub run_id: String,
    pub agent_id: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub created_at: String,
}

/// `state.json` — where the agent is right now. Rewritten atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Highest command `seq` this agent's worker has consumed. Persisted so
    /// a restarted worker never re-applies old commands.
    #[serde(default)]
    pub last_command_seq: u64,
}

impl AgentState {
    pub fn new_pending() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            status: AgentStatus::Pending,
            pid: None,
            created_at: now.clone(),
            started_at: None,
            updated_at: now,
            finished_at: None,
            result_path: None,
            error: None,
            last_command_seq: 0,
        }
    }

    /// Apply the write invariants after a caller mutation: stamp a monotonic
    /// `updated_at` and set `finished_at` on the first terminal transition.
    pub(crate) fn normalize(&mut self, was_terminal: bool) {
        let now = Utc::now().to_rfc3339();
        if now > self.updated_at {
            self.updated_at = now.clone();
        }
        if self.status.is_terminal() && !was_terminal && self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(AgentStatus::Completed.is_terminal());
        assert!(AgentStatus::Failed.is_terminal());
        assert!(AgentStatus::Canceled.is_terminal());
        assert!(!AgentStatus::Pending.is_terminal());
        assert!(!AgentStatus::Running.is_terminal());
        assert!(!AgentStatus::Paused.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Canceled).unwrap(),
            "\"canceled\""
        );
    }

    #[test]
    fn first_terminal_write_sets_finished_at() {
        let mut s = AgentState::new_pending();
        s.status = AgentStatus::Completed;
        s.normalize(false);
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn finished_at_is_not_overwritten() {
        let mut s = AgentState::new_pending();
        s.status = AgentStatus::Failed;
        s.normalize(false);
        let first = s.finished_at.clone();
        s.status = AgentStatus::Canceled;
        s.normalize(true);
        assert_eq!(s.finished_at, first);
    }

    #[test]
    fn non_terminal_write_leaves_finished_at_empty() {
        let mut s = AgentState::new_pending();
        s.status = AgentStatus::Running;
        s.normalize(false);
        assert!(s.finished_at.is_none());
    }
}
