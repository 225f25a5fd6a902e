// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The run prune engine — archive or delete finished runs.
//!
//! A run is only ever touched when **every** agent in it is terminal.
//! Classification:
//!
//! - **active** — any agent still pending/running/paused. Never touched.
//! - **failed** — all terminal, at least one failed. Touched only with
//!   `include_failed`.
//! - **eligible** — all terminal, none failed (or `include_failed`).
//!
//! Eligible runs are ordered newest-first by the latest `finished_at`
//! (falling back to the run's `created_at`); the first `keep_last` are
//! retained, and of the rest only runs older than `archive_after` are
//! acted on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::CoordStore;
use crate::StoreError;

const MAX_ARCHIVE_ATTEMPTS: u32 = 50;

/// What to do with selected runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneMode {
    /// Remove the run directory recursively.
    Delete,
    /// Rename the run directory into `archive_dir`.
    Archive { archive_dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub mode: PruneMode,
    /// Retain this many of the newest eligible runs unconditionally.
    pub keep_last: usize,
    /// Only runs that ended longer ago than this are acted on.
    pub archive_after: Duration,
    /// Treat runs containing failed agents as eligible.
    pub include_failed: bool,
    /// Plan only; touch nothing.
    pub dry_run: bool,
}

/// How a run was classified during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunClass {
    Active,
    Failed,
    Eligible,
}

/// One per-run line of the prune report.
#[derive(Debug, Clone, Serialize)]
pub struct PruneAction {
    pub run_id: String,
    pub class: RunClass,
    /// `"kept"`, `"deleted"`, `"archived"`, or `"planned"` in dry-run mode.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub actions: Vec<PruneAction>,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action == "deleted" || a.action == "archived")
            .count()
    }
}

/// Scan the run root, classify every run, and act on the selected ones.
pub fn prune_runs(store: &CoordStore, opts: &PruneOptions) -> crate::Result<PruneReport> {
    if let PruneMode::Archive { archive_dir } = &opts.mode {
        check_archive_dir(store.root(), archive_dir)?;
    }

    // Classify everything first; ordering needs the full eligible set.
    let mut eligible: Vec<(String, DateTime<Utc>)> = Vec::new();
    let mut report = PruneReport::default();

    for run in store.list_runs()? {
        let (class, ended_at) = classify(store, &run.id, &run.created_at, opts.include_failed)?;
        match class {
            RunClass::Active => report.actions.push(PruneAction {
                run_id: run.id,
                class,
                action: "kept".into(),
                destination: None,
            }),
            RunClass::Failed => report.actions.push(PruneAction {
                run_id: run.id,
                class,
                action: "kept".into(),
                destination: None,
            }),
            RunClass::Eligible => eligible.push((run.id, ended_at)),
        }
    }

    // Newest first; the first keep_last survive.
    eligible.sort_by(|a, b| b.1.cmp(&a.1));
    let cutoff = Utc::now() - chrono::Duration::from_std(opts.archive_after).unwrap_or_default();

    for (idx, (run_id, ended_at)) in eligible.into_iter().enumerate() {
        if idx < opts.keep_last || ended_at > cutoff {
            report.actions.push(PruneAction {
                run_id,
                class: RunClass::Eligible,
                action: "kept".into(),
                destination: None,
            });
            continue;
        }

        let run_dir = store.run_dir(&run_id);
        match &opts.mode {
            PruneMode::Delete => {
                if opts.dry_run {
                    report.actions.push(PruneAction {
                        run_id,
                        class: RunClass::Eligible,
                        action: "planned".into(),
                        destination: None,
                    });
                } else {
                    std::fs::remove_dir_all(&run_dir)?;
                    info!(run = %run_id, "pruned run (deleted)");
                    report.actions.push(PruneAction {
                        run_id,
                        class: RunClass::Eligible,
                        action: "deleted".into(),
                        destination: None,
                    });
                }
            }
            PruneMode::Archive { archive_dir } => {
                let dest = archive_destination(archive_dir, &run_id, ended_at)?;
                if opts.dry_run {
                    report.actions.push(PruneAction {
                        run_id,
                        class: RunClass::Eligible,
                        action: "planned".into(),
                        destination: Some(dest),
                    });
                } else {
                    std::fs::create_dir_all(archive_dir)?;
                    std::fs::rename(&run_dir, &dest)?;
                    info!(run = %run_id, dest = %dest.display(), "pruned run (archived)");
                    report.actions.push(PruneAction {
                        run_id,
                        class: RunClass::Eligible,
                        action: "archived".into(),
                        destination: Some(dest),
                    });
                }
            }
        }
    }

    Ok(report)
}

// ── Classification ────────────────────────────────────────────────────────────

fn classify(
    store: &CoordStore,
    run_id: &str,
    created_at: &str,
    include_failed: bool,
) -> crate::Result<(RunClass, DateTime<Utc>)> {
    let created = parse_ts(created_at).unwrap_or_else(Utc::now);
    let mut latest_end: Option<DateTime<Utc>> = None;
    let mut any_failed = false;

    for agent_id in store.list_agents(run_id)? {
        let state = match store.read_state(run_id, &agent_id) {
            Ok(s) => s,
            Err(e) => {
                // An unreadable state is indistinguishable from a live
                // writer mid-update; treat the run as active.
                warn!(run = run_id, agent = %agent_id, "unreadable state, keeping run: {e}");
                return Ok((RunClass::Active, created));
            }
        };
        if !state.status.is_terminal() {
            return Ok((RunClass::Active, created));
        }
        if state.status == crate::AgentStatus::Failed {
            any_failed = true;
        }
        if let Some(end) = state.finished_at.as_deref().and_then(parse_ts) {
            latest_end = Some(latest_end.map_or(end, |cur| cur.max(end)));
        }
    }

    let ended = latest_end.unwrap_or(created);
    if any_failed && !include_failed {
        return Ok((RunClass::Failed, ended));
    }
    Ok((RunClass::Eligible, ended))
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Archive destinations ──────────────────────────────────────────────────────

fn check_archive_dir(run_root: &Path, archive_dir: &Path) -> crate::Result<()> {
    // Compare on absolute paths; neither dir is required to exist yet.
    let root = run_root
        .canonicalize()
        .unwrap_or_else(|_| run_root.to_path_buf());
    let archive = archive_dir
        .canonicalize()
        .unwrap_or_else(|_| archive_dir.to_path_buf());
    if archive == root || archive.starts_with(&root) {
        return Err(StoreError::ArchiveInsideRoot(archive_dir.to_path_buf()));
    }
    Ok(())
}

/// `archive_dir/<run_id>`, with a `-<ended-ts>[-n]` suffix on collision.
fn archive_destination(
    archive_dir: &Path,
    run_id: &str,
    ended_at: DateTime<Utc>,
) -> crate::Result<PathBuf> {
    let base = archive_dir.join(run_id);
    if !base.exists() {
        return Ok(base);
    }
    let stamp = ended_at.format("%Y%m%d-%H%M%S");
    for attempt in 1..=MAX_ARCHIVE_ATTEMPTS {
        let candidate = if attempt == 1 {
            archive_dir.join(format!("{run_id}-{stamp}"))
        } else {
            archive_dir.join(format!("{run_id}-{stamp}-{attempt}"))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(StoreError::ArchiveCollision(
        run_id.to_string(),
        MAX_ARCHIVE_ATTEMPTS,
    ))
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;
    use crate::store::AgentDraft;

    fn setup() -> (tempfile::TempDir, CoordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CoordStore::new(dir.path().join("runs")).unwrap();
        (dir, store)
    }

    fn add_run(store: &CoordStore, id: &str, statuses: &[AgentStatus]) {
        store.create_run(Some(id), None).unwrap();
        for (i, status) in statuses.iter().enumerate() {
            let spec = store
                .create_agent(
                    id,
                    AgentDraft {
                        agent_id: Some(format!("a{i}")),
                        task: "t".into(),
                        ..Default::default()
                    },
                )
                .unwrap();
            let status = *status;
            store
                .update_state(id, &spec.agent_id, |s| s.status = status)
                .unwrap();
        }
    }

    fn opts(mode: PruneMode) -> PruneOptions {
        PruneOptions {
            mode,
            keep_last: 0,
            archive_after: Duration::from_secs(0),
            include_failed: false,
            dry_run: false,
        }
    }

    #[test]
    fn active_runs_are_never_touched() {
        let (_tmp, store) = setup();
        add_run(&store, "live", &[AgentStatus::Completed, AgentStatus::Running]);

        let report = prune_runs(&store, &opts(PruneMode::Delete)).unwrap();
        assert_eq!(report.removed(), 0);
        assert!(store.run_dir("live").exists());
        assert_eq!(report.actions[0].class, RunClass::Active);
    }

    #[test]
    fn failed_runs_are_kept_unless_included() {
        let (_tmp, store) = setup();
        add_run(&store, "bad", &[AgentStatus::Failed, AgentStatus::Completed]);

        let report = prune_runs(&store, &opts(PruneMode::Delete)).unwrap();
        assert_eq!(report.removed(), 0);
        assert!(store.run_dir("bad").exists());

        let mut o = opts(PruneMode::Delete);
        o.include_failed = true;
        let report = prune_runs(&store, &o).unwrap();
        assert_eq!(report.removed(), 1);
        assert!(!store.run_dir("bad").exists());
    }

    #[test]
    fn keep_last_retains_newest() {
        let (_tmp, store) = setup();
        add_run(&store, "old", &[AgentStatus::Completed]);
        std::thread::sleep(std::time::Duration::from_millis(20));
        add_run(&store, "new", &[AgentStatus::Completed]);

        let mut o = opts(PruneMode::Delete);
        o.keep_last = 1;
        prune_runs(&store, &o).unwrap();
        assert!(!store.run_dir("old").exists(), "older run pruned");
        assert!(store.run_dir("new").exists(), "newest run kept");
    }

    #[test]
    fn archive_after_spares_recent_runs() {
        let (_tmp, store) = setup();
        add_run(&store, "fresh", &[AgentStatus::Completed]);

        let mut o = opts(PruneMode::Delete);
        o.archive_after = Duration::from_secs(3600);
        let report = prune_runs(&store, &o).unwrap();
        assert_eq!(report.removed(), 0);
        assert!(store.run_dir("fresh").exists());
    }

    #[test]
    fn archive_moves_run_out_of_root() {
        let (tmp, store) = setup();
        add_run(&store, "done", &[AgentStatus::Completed, AgentStatus::Canceled]);

        let archive = tmp.path().join("archive");
        let o = opts(PruneMode::Archive {
            archive_dir: archive.clone(),
        });
        let report = prune_runs(&store, &o).unwrap();
        assert_eq!(report.removed(), 1);
        assert!(!store.run_dir("done").exists());
        assert!(archive.join("done").join("run.json").exists());
    }

    #[test]
    fn archive_collision_gets_suffixed() {
        let (tmp, store) = setup();
        add_run(&store, "done", &[AgentStatus::Completed]);

        let archive = tmp.path().join("archive");
        std::fs::create_dir_all(archive.join("done")).unwrap();

        let o = opts(PruneMode::Archive {
            archive_dir: archive.clone(),
        });
        let report = prune_runs(&store, &o).unwrap();
        let dest = report.actions[0].destination.clone().unwrap();
        assert_ne!(dest, archive.join("done"));
        assert!(dest.exists());
        let name = dest.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("done-"), "suffixed with timestamp: {name}");
    }

    #[test]
    fn archive_dir_inside_root_is_refused() {
        let (_tmp, store) = setup();
        add_run(&store, "done", &[AgentStatus::Completed]);

        let o = opts(PruneMode::Archive {
            archive_dir: store.root().join("nested"),
        });
        assert!(matches!(
            prune_runs(&store, &o),
            Err(StoreError::ArchiveInsideRoot(_))
        ));

        let o = opts(PruneMode::Archive {
            archive_dir: store.root().to_path_buf(),
        });
        assert!(prune_runs(&store, &o).is_err());
    }

    #[test]
    fn dry_run_plans_without_touching_disk() {
        let (tmp, store) = setup();
        add_run(&store, "done", &[AgentStatus::Completed]);

        let mut o = opts(PruneMode::Archive {
            archive_dir: tmp.path().join("archive"),
        });
        o.dry_run = true;
        let report = prune_runs(&store, &o).unwrap();
        assert_eq!(report.removed(), 0);
        assert_eq!(report.actions[0].action, "planned");
        assert!(store.run_dir("done").exists());
        assert!(!tmp.path().join("archive").exists());
    }

    #[test]
    fn empty_run_uses_created_at_for_age() {
        let (_tmp, store) = setup();
        store.create_run(Some("empty"), None).unwrap();

        // No agents at all: all-terminal holds vacuously, created_at governs.
        let report = prune_runs(&store, &opts(PruneMode::Delete)).unwrap();
        assert_eq!(report.removed(), 1);
        assert!(!store.run_dir("empty").exists());
    }
}
