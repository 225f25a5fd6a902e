// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The multi-agent coordinator: a file-system control plane for child agent
//! processes.
//!
//! There is no coordinator *process*. Parents and children — possibly on
//! different sides of a fork/exec boundary — coordinate through one on-disk
//! tree:
//!
//! ```text
//! <run_id>/
//!   run.json
//!   ui_state.json
//!   signals/<key>.jsonl
//!   agents/<agent_id>/
//!     spec.json          state.json       result.json
//!     commands.jsonl     events.jsonl
//!     asset/
//!     stdout.log         stderr.log
//! ```
//!
//! Two primitives make this safe without a shared runtime: atomic JSON
//! writes (tmp sibling + rename) and sequenced JSONL appends under an
//! exclusive sentinel lock. Readers may observe an older version of any
//! file but never a partial write.

mod agent;
mod error;
pub mod ids;
mod prune;
mod run;
mod store;
mod ui_state;
mod worker;

pub use agent::{AgentSpec, AgentState, AgentStatus};
pub use error::{StoreError, WorkerError};
pub use prune::{prune_runs, PruneAction, PruneMode, PruneOptions, PruneReport, RunClass};
pub use run::RunManifest;
pub use store::{AgentDraft, CoordStore, LogEntry, DEFAULT_READ_LIMIT};
pub use ui_state::{HiddenAgent, UiState, UI_STATE_VERSION};
pub use worker::{RunOutcome, WorkerController};

/// Shorthand result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
