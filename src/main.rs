// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{
    AgentCommands, AgentTarget, Cli, Commands, FilesCommands, MasterCommands, RunsCommands,
    SlaveCommands,
};
use hird_cluster::{
    config as cluster_config, AgentRunner, CommandRunner, MasterConfig, MasterGateway, MockRunner,
    NoopPresence, SlaveClient, SlaveConfig,
};
use hird_coord::{prune_runs, CoordStore, PruneMode, PruneOptions};
use hird_transfer::TransferEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Master { command } => run_master_command(&cli, command).await,
        Commands::Slave { command } => run_slave_command(&cli, command).await,
        Commands::EnsureSecret => {
            let (_config, _secret) = cluster_config::ensure_secret(cli.config.as_deref())?;
            let path = cli
                .config
                .clone()
                .unwrap_or_else(cluster_config::default_config_path);
            println!("cluster secret present in {}", path.display());
            Ok(())
        }
        Commands::Runs { command } => run_runs_command(command),
        Commands::Agent { command } => run_agent_command(command),
        Commands::Files { command } => run_files_command(&cli, command),
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("HIRD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Cancel the returned token on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_token.cancel();
        }
    });
    token
}

// ── Master ────────────────────────────────────────────────────────────────────

async fn run_master_command(cli: &Cli, cmd: &MasterCommands) -> anyhow::Result<()> {
    match cmd {
        MasterCommands::Start {
            bind,
            origins,
            accept_origin_any,
            tls,
            files_root,
        } => {
            let (config, secret) = cluster_config::ensure_secret(cli.config.as_deref())?;

            let files_root = files_root
                .clone()
                .unwrap_or_else(|| config.cluster.files.root_dir());
            let transfers = Arc::new(
                TransferEngine::new(&files_root, config.cluster.files.limits())
                    .with_context(|| format!("preparing transfer root {}", files_root.display()))?,
            );

            let mut master_config = MasterConfig {
                accept_origins: origins.clone(),
                accept_origin_any: *accept_origin_any,
                tls: config.cluster.tls.clone(),
                ..Default::default()
            };
            if let Some(bind) = bind {
                master_config.bind = bind.clone();
            }
            if *tls {
                master_config.tls.enabled = true;
            }

            let gateway = MasterGateway::new(
                master_config,
                secret,
                Arc::new(NoopPresence),
                transfers,
            );

            let token = shutdown_token();
            let gw = gateway.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                gw.shutdown();
            });

            gateway.serve().await
        }

        MasterCommands::ShowConfig => {
            let config = cluster_config::load(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ── Slave ─────────────────────────────────────────────────────────────────────

async fn run_slave_command(cli: &Cli, cmd: &SlaveCommands) -> anyhow::Result<()> {
    match cmd {
        SlaveCommands::Start {
            url,
            slave_id,
            name,
            capabilities,
            runner,
            max_inflight_runs,
            insecure,
            files_root,
        } => {
            let (config, secret) = cluster_config::ensure_secret(cli.config.as_deref())?;

            let slave_id = slave_id.clone().unwrap_or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "hird-slave".to_string())
            });

            let mut slave_config = SlaveConfig::new(url.clone(), slave_id, secret);
            if let Some(name) = name {
                slave_config.name = name.clone();
            }
            slave_config.capabilities = capabilities.clone();
            slave_config.max_inflight_runs = (*max_inflight_runs).max(1);
            slave_config.insecure_skip_verify =
                *insecure || config.cluster.tls.insecure_skip_verify;

            let files_root = files_root
                .clone()
                .unwrap_or_else(|| config.cluster.files.root_dir());
            let transfers = Arc::new(
                TransferEngine::new(&files_root, config.cluster.files.limits())
                    .with_context(|| format!("preparing transfer root {}", files_root.display()))?,
            );

            let runner: Arc<dyn AgentRunner> = match runner {
                Some(command_line) => {
                    let mut parts = command_line.split_whitespace();
                    let program = parts
                        .next()
                        .context("--runner must name a program")?
                        .to_string();
                    let args: Vec<String> = parts.map(str::to_string).collect();
                    Arc::new(CommandRunner::new(program, args))
                }
                None => {
                    tracing::warn!("no --runner configured; tasks will be echoed back");
                    Arc::new(MockRunner::default())
                }
            };

            let client = SlaveClient::new(slave_config, runner, transfers);
            client.run(shutdown_token()).await
        }
    }
}

// ── Runs ──────────────────────────────────────────────────────────────────────

fn default_run_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("hird")
        .join("runs")
}

fn run_runs_command(cmd: &RunsCommands) -> anyhow::Result<()> {
    match cmd {
        RunsCommands::List { root } => {
            let store = CoordStore::new(root.clone().unwrap_or_else(default_run_root))?;
            let runs = store.list_runs()?;
            if runs.is_empty() {
                println!("No runs under {}.", store.root().display());
                return Ok(());
            }
            for run in runs {
                let agents = store.list_agents(&run.id)?;
                let title = run.title().unwrap_or("-");
                println!(
                    "{}  {}  agents: {}  {}",
                    run.id,
                    run.created_at,
                    agents.len(),
                    title
                );
            }
            Ok(())
        }

        RunsCommands::Prune {
            root,
            archive_dir,
            keep_last,
            older_than,
            include_failed,
            dry_run,
        } => {
            let store = CoordStore::new(root.clone().unwrap_or_else(default_run_root))?;
            let archive_after = humantime::parse_duration(older_than)
                .with_context(|| format!("invalid --older-than value {older_than:?}"))?;
            let mode = match archive_dir {
                Some(dir) => PruneMode::Archive {
                    archive_dir: dir.clone(),
                },
                None => PruneMode::Delete,
            };
            let report = prune_runs(
                &store,
                &PruneOptions {
                    mode,
                    keep_last: *keep_last,
                    archive_after,
                    include_failed: *include_failed,
                    dry_run: *dry_run,
                },
            )?;

            for action in &report.actions {
                match &action.destination {
                    Some(dest) => println!(
                        "{:10} {:8} {} -> {}",
                        action.action,
                        format!("{:?}", action.class).to_lowercase(),
                        action.run_id,
                        dest.display()
                    ),
                    None => println!(
                        "{:10} {:8} {}",
                        action.action,
                        format!("{:?}", action.class).to_lowercase(),
                        action.run_id
                    ),
                }
            }
            println!("{} run(s) pruned.", report.removed());
            Ok(())
        }
    }
}

// ── Agent control ─────────────────────────────────────────────────────────────

fn agent_store(target: &AgentTarget) -> anyhow::Result<CoordStore> {
    Ok(CoordStore::new(
        target.root.clone().unwrap_or_else(default_run_root),
    )?)
}

fn append_worker_command(target: &AgentTarget, kind: &str) -> anyhow::Result<()> {
    let store = agent_store(target)?;
    let mut fields = serde_json::Map::new();
    fields.insert("command".into(), serde_json::json!(kind));
    let seq = store.append_command(&target.run, &target.agent, fields)?;
    println!("{kind} queued for {}/{} (seq {seq})", target.run, target.agent);
    Ok(())
}

fn run_agent_command(cmd: &AgentCommands) -> anyhow::Result<()> {
    match cmd {
        AgentCommands::Pause(target) => append_worker_command(target, "pause"),
        AgentCommands::Resume(target) => append_worker_command(target, "resume"),
        AgentCommands::Cancel(target) => append_worker_command(target, "cancel"),

        AgentCommands::Message { target, text } => {
            let store = agent_store(target)?;
            let mut fields = serde_json::Map::new();
            fields.insert("command".into(), serde_json::json!("message"));
            fields.insert("text".into(), serde_json::json!(text));
            let seq = store.append_command(&target.run, &target.agent, fields)?;
            println!(
                "message queued for {}/{} (seq {seq})",
                target.run, target.agent
            );
            Ok(())
        }

        AgentCommands::Events { target, after } => {
            let store = agent_store(target)?;
            for entry in store.read_events(&target.run, &target.agent, *after, 1000)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(())
        }

        AgentCommands::State(target) => {
            let store = agent_store(target)?;
            let state = store.read_state(&target.run, &target.agent)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
    }
}

// ── Files ─────────────────────────────────────────────────────────────────────

fn run_files_command(cli: &Cli, cmd: &FilesCommands) -> anyhow::Result<()> {
    let config = cluster_config::load(cli.config.as_deref())?;
    let engine = |root_override: &Option<PathBuf>| -> anyhow::Result<TransferEngine> {
        let root = root_override
            .clone()
            .unwrap_or_else(|| config.cluster.files.root_dir());
        Ok(TransferEngine::new(&root, config.cluster.files.limits())?)
    };

    match cmd {
        FilesCommands::Sweep { files_root } => {
            let engine = engine(files_root)?;
            let removed = engine.sweep_retention()?;
            println!("{removed} expired inbox day(s) removed.");
            Ok(())
        }
        FilesCommands::Usage { files_root } => {
            let engine = engine(files_root)?;
            println!("{} bytes in inbox", engine.inbox_usage_bytes());
            Ok(())
        }
    }
}
