// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The in-child-process control loop.
//!
//! A worker never receives signals or kill requests through a runtime
//! primitive — the pause/resume/cancel contract lives entirely in the
//! append-only command log. The agent implementation calls
//! [`WorkerController::checkpoint`] at every safe point (and around tool
//! calls via the hooks); commands appended by any parent process are applied
//! there, in order, exactly once.
//!
//! Cancellation is a return value: `checkpoint` yields
//! [`WorkerError::Canceled`] and the worker's top-level loop unwinds into
//! [`WorkerController::finish`]. Nothing is killed mid-write.

use std::time::Duration;

use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::AgentStatus;
use crate::store::{CoordStore, DEFAULT_READ_LIMIT};
use crate::WorkerError;

/// Poll cadence while paused, waiting for `resume` or `cancel`.
const PAUSE_POLL: Duration = Duration::from_millis(300);

/// Terminal outcome the worker reports through [`WorkerController::finish`].
#[derive(Debug)]
pub enum RunOutcome {
    Completed(serde_json::Value),
    Failed(String),
    Canceled,
}

/// Control-loop state for one child agent process.
pub struct WorkerController {
    store: CoordStore,
    run_id: String,
    agent_id: String,
    last_command_seq: u64,
    paused: bool,
    pending_messages: Vec<String>,
    cancel: CancellationToken,
}

impl WorkerController {
    /// Attach to an existing agent. Picks up `last_command_seq` from the
    /// persisted state so a restarted worker never re-applies old commands.
    pub fn new(
        store: CoordStore,
        run_id: impl Into<String>,
        agent_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> crate::Result<Self> {
        let run_id = run_id.into();
        let agent_id = agent_id.into();
        let state = store.read_state(&run_id, &agent_id)?;
        Ok(Self {
            store,
            run_id,
            agent_id,
            last_command_seq: state.last_command_seq,
            paused: false,
            pending_messages: Vec::new(),
            cancel,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Mark the agent running: record our pid, stamp `started_at` on first
    /// start, and announce ourselves in the event log.
    pub fn start(&mut self) -> crate::Result<()> {
        self.store.update_state(&self.run_id, &self.agent_id, |s| {
            s.status = AgentStatus::Running;
            s.pid = Some(std::process::id());
            if s.started_at.is_none() {
                s.started_at = Some(chrono::Utc::now().to_rfc3339());
            }
        })?;
        self.emit_event("worker_started", Map::new())?;
        info!(run = %self.run_id, agent = %self.agent_id, "worker started");
        Ok(())
    }

    /// Cooperative yield: apply any commands appended since the last
    /// checkpoint, then block while paused.
    ///
    /// Returns [`WorkerError::Canceled`] on a `cancel` command or context
    /// cancellation; the caller must unwind to [`WorkerController::finish`].
    pub async fn checkpoint(&mut self, stage: &str) -> std::result::Result<(), WorkerError> {
        if self.cancel.is_cancelled() {
            return Err(WorkerError::Canceled);
        }
        self.apply_pending_commands(stage)?;

        while self.paused {
            debug!(run = %self.run_id, agent = %self.agent_id, stage, "paused, waiting");
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(WorkerError::Canceled),
                _ = tokio::time::sleep(PAUSE_POLL) => {}
            }
            self.apply_pending_commands(stage)?;
        }
        Ok(())
    }

    fn apply_pending_commands(&mut self, stage: &str) -> std::result::Result<(), WorkerError> {
        loop {
            let batch = self.store.read_commands(
                &self.run_id,
                &self.agent_id,
                self.last_command_seq,
                DEFAULT_READ_LIMIT,
            )?;
            if batch.is_empty() {
                return Ok(());
            }
            for cmd in batch {
                let kind = cmd.str_field("command").unwrap_or("").to_string();
                let seq = cmd.seq;
                match kind.as_str() {
                    "pause" => {
                        self.paused = true;
                        self.transition(AgentStatus::Paused, seq)?;
                        self.emit_command_event("command_pause", seq, stage)?;
                    }
                    "resume" => {
                        self.paused = false;
                        self.transition(AgentStatus::Running, seq)?;
                        self.emit_command_event("command_resume", seq, stage)?;
                    }
                    "cancel" => {
                        self.persist_seq(seq)?;
                        self.emit_command_event("command_cancel", seq, stage)?;
                        return Err(WorkerError::Canceled);
                    }
                    "message" => {
                        if let Some(text) = cmd.str_field("text") {
                            self.pending_messages.push(text.to_string());
                        }
                        self.persist_seq(seq)?;
                        self.emit_command_event("command_message", seq, stage)?;
                    }
                    _ => {
                        self.persist_seq(seq)?;
                        let mut fields = Map::new();
                        fields.insert("command".into(), serde_json::json!(kind));
                        fields.insert("command_seq".into(), serde_json::json!(seq));
                        fields.insert("stage".into(), serde_json::json!(stage));
                        self.emit_event("command_unknown", fields)?;
                    }
                }
            }
        }
    }

    /// Hook to call immediately before a tool invocation.
    pub async fn before_tool(
        &mut self,
        name: &str,
        args: &serde_json::Value,
    ) -> std::result::Result<(), WorkerError> {
        self.checkpoint(&format!("before_tool:{name}")).await?;
        let mut fields = Map::new();
        fields.insert("tool".into(), serde_json::json!(name));
        fields.insert("args".into(), args.clone());
        self.emit_event("tool_call_started", fields)?;
        Ok(())
    }

    /// Hook to call immediately after a tool invocation returns.
    pub async fn after_tool(
        &mut self,
        name: &str,
        args: &serde_json::Value,
        result: Option<&str>,
        error: Option<&str>,
        duration: Duration,
    ) -> std::result::Result<(), WorkerError> {
        let mut fields = Map::new();
        fields.insert("tool".into(), serde_json::json!(name));
        fields.insert("args".into(), args.clone());
        if let Some(r) = result {
            fields.insert("result".into(), serde_json::json!(r));
        }
        if let Some(e) = error {
            fields.insert("error".into(), serde_json::json!(e));
        }
        fields.insert(
            "duration_ms".into(),
            serde_json::json!(duration.as_millis() as u64),
        );
        self.emit_event("tool_call_finished", fields)?;
        self.checkpoint(&format!("after_tool:{name}")).await
    }

    /// Messages queued by `message` commands since the last drain.
    pub fn drain_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_messages)
    }

    /// Record the terminal outcome: write `result.json`, update the state
    /// (the store enforces the `finished_at` invariant), announce the end.
    pub fn finish(&mut self, outcome: RunOutcome) -> crate::Result<()> {
        let (status, error, result) = match outcome {
            RunOutcome::Completed(value) => (AgentStatus::Completed, None, Some(value)),
            RunOutcome::Failed(err) => (AgentStatus::Failed, Some(err), None),
            RunOutcome::Canceled => (AgentStatus::Canceled, None, None),
        };

        let result_doc = serde_json::json!({
            "status": status,
            "result": result,
            "error": error,
            "finished_at": chrono::Utc::now().to_rfc3339(),
        });
        let result_path = self
            .store
            .write_result(&self.run_id, &self.agent_id, &result_doc)?;

        let last_seq = self.last_command_seq;
        self.store.update_state(&self.run_id, &self.agent_id, |s| {
            s.status = status;
            s.error = error.clone();
            s.result_path = Some(result_path.clone());
            s.last_command_seq = last_seq;
        })?;

        let mut fields = Map::new();
        fields.insert("status".into(), serde_json::json!(status));
        self.emit_event("worker_finished", fields)?;
        info!(run = %self.run_id, agent = %self.agent_id, ?status, "worker finished");
        Ok(())
    }

    /// Map the worker loop's result onto a terminal outcome and record it.
    pub fn finish_with(
        &mut self,
        result: std::result::Result<serde_json::Value, WorkerError>,
    ) -> crate::Result<()> {
        let outcome = match result {
            Ok(value) => RunOutcome::Completed(value),
            Err(WorkerError::Canceled) => RunOutcome::Canceled,
            Err(WorkerError::Store(e)) => RunOutcome::Failed(e.to_string()),
        };
        self.finish(outcome)
    }

    // ── Internal ──────────────────────────────────────────────────────────────

    fn transition(&mut self, status: AgentStatus, seq: u64) -> crate::Result<()> {
        self.last_command_seq = seq;
        self.store.update_state(&self.run_id, &self.agent_id, |s| {
            s.status = status;
            s.last_command_seq = seq;
        })?;
        Ok(())
    }

    fn persist_seq(&mut self, seq: u64) -> crate::Result<()> {
        self.last_command_seq = seq;
        self.store.update_state(&self.run_id, &self.agent_id, |s| {
            s.last_command_seq = seq;
        })?;
        Ok(())
    }

    fn emit_command_event(&self, event: &str, seq: u64, stage: &str) -> crate::Result<()> {
        let mut fields = Map::new();
        fields.insert("command_seq".into(), serde_json::json!(seq));
        fields.insert("stage".into(), serde_json::json!(stage));
        self.emit_event(event, fields)
    }

    fn emit_event(&self, event: &str, mut fields: Map<String, serde_json::Value>) -> crate::Result<()> {
        fields.insert("event".into(), serde_json::json!(event));
        self.store.append_event(&self.run_id, &self.agent_id, fields)?;
        Ok(())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
