// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

// ── Master subcommand ─────────────────────────────────────────────────────────

/// `hird master` subcommands.
#[derive(Subcommand, Debug)]
pub enum MasterCommands {
    /// Start the master gateway.
    ///
    /// Accepts slave connections over WebSocket, orchestrates remote task
    /// execution and file transfer. The shared cluster secret is generated
    /// on first start and stored in the cluster config file.
    Start {
        /// `host:port` to listen on. Default: 127.0.0.1:18890.
        #[arg(long)]
        bind: Option<String>,

        /// Allowed Origin patterns (`*` wildcards). May be repeated.
        /// No patterns means any origin is accepted.
        #[arg(long = "origin")]
        origins: Vec<String>,

        /// Accept any Origin regardless of patterns.
        #[arg(long)]
        accept_origin_any: bool,

        /// Serve wss:// with a (self-signed) TLS certificate.
        #[arg(long)]
        tls: bool,

        /// Override the file-transfer root directory.
        #[arg(long)]
        files_root: Option<PathBuf>,
    },

    /// Print the resolved cluster configuration and exit.
    ShowConfig,
}

// ── Slave subcommand ──────────────────────────────────────────────────────────

/// `hird slave` subcommands.
#[derive(Subcommand, Debug)]
pub enum SlaveCommands {
    /// Start a slave node and keep it connected to the master.
    ///
    /// Reconnects with capped exponential backoff. Tasks received via
    /// `agent.run` are executed by the configured runner command; without
    /// one, tasks are echoed back (useful for wiring tests).
    Start {
        /// Master WebSocket URL.
        #[arg(long, default_value = "ws://127.0.0.1:18890/ws")]
        url: String,

        /// Stable slave identifier. Defaults to the hostname.
        #[arg(long)]
        slave_id: Option<String>,

        /// Human-readable name shown in the registry.
        #[arg(long)]
        name: Option<String>,

        /// Capability tags, e.g. `--capability rust --capability ci`.
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        /// Runner command; the task text is piped to its stdin and stdout
        /// becomes the result. Example: `--runner "my-agent --headless"`.
        #[arg(long)]
        runner: Option<String>,

        /// Concurrent task capacity; excess requests are answered `busy`.
        #[arg(long, default_value_t = 1)]
        max_inflight_runs: usize,

        /// Skip TLS certificate verification (self-signed masters only).
        #[arg(long)]
        insecure: bool,

        /// Override the file-transfer root directory.
        #[arg(long)]
        files_root: Option<PathBuf>,
    },
}

// ── Runs subcommand ───────────────────────────────────────────────────────────

/// `hird runs` subcommands.
#[derive(Subcommand, Debug)]
pub enum RunsCommands {
    /// List runs under the run root, newest first.
    List {
        /// Run root directory. Default: `~/.local/share/hird/runs`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Archive or delete finished runs.
    ///
    /// Runs with any non-terminal agent are never touched. Runs containing
    /// failed agents are kept unless --include-failed is given.
    Prune {
        /// Run root directory. Default: `~/.local/share/hird/runs`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Archive into this directory instead of deleting.
        /// Must live outside the run root.
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Keep this many of the newest eligible runs.
        #[arg(long, default_value_t = 5)]
        keep_last: usize,

        /// Only prune runs that ended longer ago than this (e.g. "7d", "12h").
        #[arg(long, default_value = "7d")]
        older_than: String,

        /// Also prune runs containing failed agents.
        #[arg(long)]
        include_failed: bool,

        /// Show what would happen without touching anything.
        #[arg(long)]
        dry_run: bool,
    },
}

// ── Agent subcommand ──────────────────────────────────────────────────────────

/// `hird agent` subcommands — drive a child agent through its command log.
#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Pause the agent at its next checkpoint.
    Pause(AgentTarget),

    /// Resume a paused agent.
    Resume(AgentTarget),

    /// Cancel the agent (cooperative — takes effect at its next checkpoint).
    Cancel(AgentTarget),

    /// Queue a message for the agent to drain at its next checkpoint.
    Message {
        #[command(flatten)]
        target: AgentTarget,
        /// The message text.
        text: String,
    },

    /// Print the agent's event log.
    Events {
        #[command(flatten)]
        target: AgentTarget,
        /// Only events with a sequence number greater than this.
        #[arg(long, default_value_t = 0)]
        after: u64,
    },

    /// Print the agent's current state.
    State(AgentTarget),
}

#[derive(clap::Args, Debug)]
pub struct AgentTarget {
    /// Run root directory. Default: `~/.local/share/hird/runs`.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Run id.
    #[arg(long)]
    pub run: String,

    /// Agent id.
    #[arg(long)]
    pub agent: String,
}

// ── Files subcommand ──────────────────────────────────────────────────────────

/// `hird files` subcommands.
#[derive(Subcommand, Debug)]
pub enum FilesCommands {
    /// Delete inbox days older than the configured retention window.
    Sweep {
        /// Override the file-transfer root directory.
        #[arg(long)]
        files_root: Option<PathBuf>,
    },

    /// Print current inbox usage in bytes.
    Usage {
        /// Override the file-transfer root directory.
        #[arg(long)]
        files_root: Option<PathBuf>,
    },
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the cluster master.
    Master {
        #[command(subcommand)]
        command: MasterCommands,
    },

    /// Run a cluster slave node.
    Slave {
        #[command(subcommand)]
        command: SlaveCommands,
    },

    /// Generate the shared cluster secret if the config has none.
    EnsureSecret,

    /// Inspect and prune coordinator runs.
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },

    /// Control child agents through the coordinator command log.
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },

    /// File-transfer housekeeping.
    Files {
        #[command(subcommand)]
        command: FilesCommands,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "hird",
    about = "A distributed agent cluster: master, slaves, and a file-based multi-agent coordinator",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the cluster config file. Default: ~/.config/hird/cluster.json.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (or set HIRD_LOG / RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
