// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-run UI-state ledger: hidden agents and reported results.
//!
//! Frontends use this to remember which agents the operator dismissed and
//! which results were already surfaced, so a refresh never re-announces
//! them. Updates are read-modify-write under the file lock with an atomic
//! rewrite, same as agent state.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::store::{write_json_atomic, CoordStore};

/// Current on-disk schema version.
pub const UI_STATE_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenAgent {
    pub agent_id: String,
    /// First time the agent was hidden; later hides keep this.
    pub hidden_at: String,
    /// Latest reason wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `<run>/ui_state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    pub version: u32,
    #[serde(default)]
    pub hidden_agents: BTreeMap<String, HiddenAgent>,
    #[serde(default)]
    pub reported_agent_results: BTreeMap<String, Map<String, serde_json::Value>>,
    pub updated_at: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            version: UI_STATE_VERSION,
            hidden_agents: BTreeMap::new(),
            reported_agent_results: BTreeMap::new(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

impl CoordStore {
    pub fn load_ui_state(&self, run_id: &str) -> crate::Result<UiState> {
        let path = self.ui_state_path(run_id);
        if !path.exists() {
            return Ok(UiState::default());
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    fn update_ui_state<F>(&self, run_id: &str, mutate: F) -> crate::Result<UiState>
    where
        F: FnOnce(&mut UiState),
    {
        let path = self.ui_state_path(run_id);
        let _lock = crate::store::ui_lock(&path)?;
        let mut state = self.load_ui_state(run_id)?;
        mutate(&mut state);
        state.version = UI_STATE_VERSION;
        state.updated_at = Utc::now().to_rfc3339();
        write_json_atomic(&path, &state)?;
        Ok(state)
    }

    /// Hide an agent. Deduplicates by id: the first hide timestamp is kept,
    /// the reason is replaced by the latest non-empty one.
    pub fn hide_agent(
        &self,
        run_id: &str,
        agent_id: &str,
        reason: Option<&str>,
    ) -> crate::Result<UiState> {
        self.update_ui_state(run_id, |state| {
            let entry = state
                .hidden_agents
                .entry(agent_id.to_string())
                .or_insert_with(|| HiddenAgent {
                    agent_id: agent_id.to_string(),
                    hidden_at: Utc::now().to_rfc3339(),
                    reason: None,
                });
            if let Some(r) = reason {
                entry.reason = Some(r.to_string());
            }
        })
    }

    /// Remove an agent from the hidden set.
    pub fn unhide_agent(&self, run_id: &str, agent_id: &str) -> crate::Result<UiState> {
        self.update_ui_state(run_id, |state| {
            state.hidden_agents.remove(agent_id);
        })
    }

    /// Record that an agent's result was surfaced, merging `fields` into any
    /// existing entry and stamping `reported_at`.
    pub fn mark_result_reported(
        &self,
        run_id: &str,
        agent_id: &str,
        fields: Map<String, serde_json::Value>,
    ) -> crate::Result<UiState> {
        self.update_ui_state(run_id, |state| {
            let entry = state
                .reported_agent_results
                .entry(agent_id.to_string())
                .or_default();
            for (k, v) in fields {
                entry.insert(k, v);
            }
            entry.insert(
                "reported_at".to_string(),
                serde_json::json!(Utc::now().to_rfc3339()),
            );
        })
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
