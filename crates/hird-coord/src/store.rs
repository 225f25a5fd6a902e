// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The coordinator store: directory layout, atomic JSON, and sequenced
//! JSONL logs.
//!
//! # Cross-process rules
//!
//! - Durable JSON documents (`run.json`, `state.json`, `ui_state.json`,
//!   `result.json`) are written to a `.tmp_json_*` sibling and renamed over
//!   the target. Readers never see a partial document.
//! - JSONL appends take an exclusive sentinel lock (`<file>.lock`, created
//!   with create-exclusive semantics, bounded busy-wait), scan the file for
//!   the last `seq`, and append `seq = last + 1`. Sequences are strictly
//!   monotonic and gap-free per file.
//! - Reads are lock-free and tolerant: malformed or truncated trailing
//!   lines are skipped, not fatal — a reader racing an append sees either
//!   the old log or the new one.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{AgentSpec, AgentState};
use crate::ids::{default_agent_id, default_run_id, sanitize_id};
use crate::run::RunManifest;
use crate::StoreError;

/// Default maximum entries returned by a sequenced read.
pub const DEFAULT_READ_LIMIT: usize = 100;

/// How long an append waits for the sentinel lock before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_POLL: Duration = Duration::from_millis(10);

/// Poll cadence for [`CoordStore::wait_for_signal`].
const SIGNAL_POLL: Duration = Duration::from_millis(300);

// ── Log entries ───────────────────────────────────────────────────────────────

/// One line of a sequenced JSONL log. Commands, events, and signals all
/// share this shape: `{seq, …payload, created_at}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    #[serde(flatten)]
    pub fields: Map<String, serde_json::Value>,
    pub created_at: String,
}

impl LogEntry {
    /// Convenience accessor for a string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Handle to a run-root directory. Cheap to clone; all state is on disk,
/// so any number of processes can hold one for the same root.
#[derive(Debug, Clone)]
pub struct CoordStore {
    root: PathBuf,
}

/// Inputs for [`CoordStore::create_agent`].
#[derive(Debug, Clone, Default)]
pub struct AgentDraft {
    pub agent_id: Option<String>,
    pub task: String,
    pub max_turns: Option<u32>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub metadata: Option<std::collections::HashMap<String, serde_json::Value>>,
}

impl CoordStore {
    pub fn new(root: impl Into<PathBuf>) -> crate::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Layout ────────────────────────────────────────────────────────────────

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    pub fn agent_dir(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.run_dir(run_id).join("agents").join(agent_id)
    }

    fn run_manifest_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("run.json")
    }

    fn spec_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("spec.json")
    }

    fn state_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("state.json")
    }

    pub fn result_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("result.json")
    }

    fn commands_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("commands.jsonl")
    }

    fn events_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("events.jsonl")
    }

    fn signal_path(&self, run_id: &str, key: &str) -> PathBuf {
        self.run_dir(run_id).join("signals").join(format!("{key}.jsonl"))
    }

    pub fn ui_state_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("ui_state.json")
    }

    pub fn stdout_log_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("stdout.log")
    }

    pub fn stderr_log_path(&self, run_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(run_id, agent_id).join("stderr.log")
    }

    // ── Runs ──────────────────────────────────────────────────────────────────

    /// Create a run directory. A `None` id yields `run-YYYYMMDD-HHMMSS-<hex6>`.
    pub fn create_run(
        &self,
        id: Option<&str>,
        metadata: Option<std::collections::HashMap<String, serde_json::Value>>,
    ) -> crate::Result<RunManifest> {
        let run_id = match id {
            Some(raw) => sanitize_id(raw).ok_or_else(|| StoreError::InvalidId(raw.to_string()))?,
            None => default_run_id(),
        };
        let dir = self.run_dir(&run_id);
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir(&dir)?;
        std::fs::create_dir_all(dir.join("signals"))?;
        std::fs::create_dir_all(dir.join("agents"))?;

        let manifest = RunManifest {
            id: run_id.clone(),
            created_at: Utc::now().to_rfc3339(),
            metadata,
        };
        write_json_atomic(&self.run_manifest_path(&run_id), &manifest)?;
        Ok(manifest)
    }

    pub fn load_run(&self, run_id: &str) -> crate::Result<RunManifest> {
        let id = sanitize_id(run_id).ok_or_else(|| StoreError::InvalidId(run_id.to_string()))?;
        let path = self.run_manifest_path(&id);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("run {id}")));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Every run with a readable manifest, newest first.
    pub fn list_runs(&self) -> crate::Result<Vec<RunManifest>> {
        let mut runs = Vec::new();
        if !self.root.exists() {
            return Ok(runs);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let manifest = entry.path().join("run.json");
            let Ok(text) = std::fs::read_to_string(&manifest) else {
                continue;
            };
            match serde_json::from_str::<RunManifest>(&text) {
                Ok(m) => runs.push(m),
                Err(e) => debug!(path = %manifest.display(), "skipping unreadable manifest: {e}"),
            }
        }
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    // ── Agents ────────────────────────────────────────────────────────────────

    /// Create an agent under a run: directory skeleton, `spec.json`, and an
    /// initial `pending` state.
    pub fn create_agent(&self, run_id: &str, draft: AgentDraft) -> crate::Result<AgentSpec> {
        if draft.task.trim().is_empty() {
            return Err(StoreError::InvalidSpec("task must not be empty".into()));
        }
        // load_run sanitizes; use its id for every path from here on.
        let run_id = self.load_run(run_id)?.id;

        let agent_id = match draft.agent_id.as_deref() {
            Some(raw) => sanitize_id(raw).ok_or_else(|| StoreError::InvalidId(raw.to_string()))?,
            None => default_agent_id(),
        };
        let dir = self.agent_dir(&run_id, &agent_id);
        std::fs::create_dir_all(dir.join("asset"))?;

        let spec = AgentSpec {
            run_id: run_id.clone(),
            agent_id: agent_id.clone(),
            task: draft.task,
            max_turns: draft.max_turns,
            temperature: draft.temperature,
            max_tokens: draft.max_tokens,
            metadata: draft.metadata,
            created_at: Utc::now().to_rfc3339(),
        };
        write_json_atomic(&self.spec_path(&run_id, &agent_id), &spec)?;
        write_json_atomic(&self.state_path(&run_id, &agent_id), &AgentState::new_pending())?;
        Ok(spec)
    }

    pub fn read_spec(&self, run_id: &str, agent_id: &str) -> crate::Result<AgentSpec> {
        let path = self.spec_path(run_id, agent_id);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("agent {run_id}/{agent_id}")));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn read_state(&self, run_id: &str, agent_id: &str) -> crate::Result<AgentState> {
        let path = self.state_path(run_id, agent_id);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("agent {run_id}/{agent_id}")));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Read-modify-write the agent state under its file lock, enforcing the
    /// terminal-transition and monotonic-`updated_at` invariants.
    pub fn update_state<F>(&self, run_id: &str, agent_id: &str, mutate: F) -> crate::Result<AgentState>
    where
        F: FnOnce(&mut AgentState),
    {
        let path = self.state_path(run_id, agent_id);
        let _lock = FileLock::acquire(&path)?;
        let mut state = self.read_state(run_id, agent_id)?;
        let was_terminal = state.status.is_terminal();
        mutate(&mut state);
        state.normalize(was_terminal);
        write_json_atomic(&path, &state)?;
        Ok(state)
    }

    /// Write `result.json` atomically; returns the path relative to the run
    /// directory (the form recorded in `state.result_path`).
    pub fn write_result(
        &self,
        run_id: &str,
        agent_id: &str,
        result: &serde_json::Value,
    ) -> crate::Result<String> {
        write_json_atomic(&self.result_path(run_id, agent_id), result)?;
        Ok(format!("agents/{agent_id}/result.json"))
    }

    /// Agent ids present under a run, sorted.
    pub fn list_agents(&self, run_id: &str) -> crate::Result<Vec<String>> {
        let dir = self.run_dir(run_id).join("agents");
        let mut ids = Vec::new();
        if !dir.exists() {
            return Ok(ids);
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    // ── Commands, events, signals ─────────────────────────────────────────────

    pub fn append_command(
        &self,
        run_id: &str,
        agent_id: &str,
        fields: Map<String, serde_json::Value>,
    ) -> crate::Result<u64> {
        append_jsonl(&self.commands_path(run_id, agent_id), fields)
    }

    pub fn read_commands(
        &self,
        run_id: &str,
        agent_id: &str,
        after_seq: u64,
        limit: usize,
    ) -> crate::Result<Vec<LogEntry>> {
        read_jsonl(&self.commands_path(run_id, agent_id), after_seq, limit)
    }

    pub fn append_event(
        &self,
        run_id: &str,
        agent_id: &str,
        fields: Map<String, serde_json::Value>,
    ) -> crate::Result<u64> {
        append_jsonl(&self.events_path(run_id, agent_id), fields)
    }

    pub fn read_events(
        &self,
        run_id: &str,
        agent_id: &str,
        after_seq: u64,
        limit: usize,
    ) -> crate::Result<Vec<LogEntry>> {
        read_jsonl(&self.events_path(run_id, agent_id), after_seq, limit)
    }

    pub fn append_signal(
        &self,
        run_id: &str,
        key: &str,
        fields: Map<String, serde_json::Value>,
    ) -> crate::Result<u64> {
        let key = sanitize_id(key).ok_or_else(|| StoreError::InvalidId(key.to_string()))?;
        append_jsonl(&self.signal_path(run_id, &key), fields)
    }

    pub fn read_signals(
        &self,
        run_id: &str,
        key: &str,
        after_seq: u64,
        limit: usize,
    ) -> crate::Result<Vec<LogEntry>> {
        let key = sanitize_id(key).ok_or_else(|| StoreError::InvalidId(key.to_string()))?;
        read_jsonl(&self.signal_path(run_id, &key), after_seq, limit)
    }

    /// Poll for signal entries past `after_seq` until some arrive, the
    /// deadline passes, or the caller's token is canceled.
    pub async fn wait_for_signal(
        &self,
        run_id: &str,
        key: &str,
        after_seq: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> crate::Result<Vec<LogEntry>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self.read_signals(run_id, key, after_seq, DEFAULT_READ_LIMIT)?;
            if !found.is_empty() {
                return Ok(found);
            }
            if cancel.is_cancelled() {
                return Err(StoreError::Canceled);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(StoreError::WaitTimeout);
            }
            let nap = SIGNAL_POLL.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(StoreError::Canceled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

// ── Atomic JSON ───────────────────────────────────────────────────────────────

/// Write `value` to `path` via a `.tmp_json_*` sibling and rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> crate::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut suffix = [0u8; 4];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    let tmp = parent.join(format!(".tmp_json_{}", hex::encode(suffix)));
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        f.write_all(b"\n")?;
        f.sync_all()?;
    }
    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e.into())
        }
    }
}

// ── Sequenced JSONL ───────────────────────────────────────────────────────────

fn append_jsonl(path: &Path, mut fields: Map<String, serde_json::Value>) -> crate::Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _lock = FileLock::acquire(path)?;

    let seq = last_seq(path)? + 1;
    // The envelope owns these keys; a payload must not smuggle its own.
    fields.remove("seq");
    fields.remove("created_at");
    let entry = LogEntry {
        seq,
        fields,
        created_at: Utc::now().to_rfc3339(),
    };

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    // A writer that died mid-line leaves an unterminated tail; start a fresh
    // line so the torn fragment stays isolated and skippable.
    if !ends_with_newline(path)? {
        file.write_all(b"\n")?;
    }
    file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(seq)
}

fn ends_with_newline(path: &Path) -> crate::Result<bool> {
    use std::io::{Read, Seek, SeekFrom};
    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    if f.metadata()?.len() == 0 {
        return Ok(true);
    }
    f.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Scan the log for the highest `seq`, tolerating malformed lines.
fn last_seq(path: &Path) -> crate::Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::with_capacity(1 << 20, std::fs::File::open(path)?);
    let mut last = 0u64;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        if let Some(seq) = value.get("seq").and_then(|v| v.as_u64()) {
            last = last.max(seq);
        }
    }
    Ok(last)
}

fn read_jsonl(path: &Path, after_seq: u64, limit: usize) -> crate::Result<Vec<LogEntry>> {
    let mut out = Vec::new();
    if !path.exists() {
        return Ok(out);
    }
    let limit = if limit == 0 { DEFAULT_READ_LIMIT } else { limit };
    let reader = BufReader::with_capacity(1 << 20, std::fs::File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<LogEntry>(trimmed) else {
            continue;
        };
        if entry.seq > after_seq {
            out.push(entry);
            if out.len() >= limit {
                break;
            }
        }
    }
    Ok(out)
}

// ── File lock ─────────────────────────────────────────────────────────────────

/// Exclusive sentinel lock: `<file>.lock` created with create-exclusive
/// semantics. Held for the duration of one append or state update; removed
/// on drop.
pub(crate) struct FileLock {
    path: PathBuf,
}

/// Lock helper for sibling modules that guard their own JSON documents.
pub(crate) fn ui_lock(path: &Path) -> crate::Result<FileLock> {
    FileLock::acquire(path)
}

impl FileLock {
    fn acquire(target: &Path) -> crate::Result<Self> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".into());
        let path = target.with_file_name(format!("{name}.lock"));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let deadline = std::time::Instant::now() + LOCK_WAIT;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if std::time::Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout(path));
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
