// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The [`AgentRunner`] capability — the seam between the cluster transport
//! and whatever actually executes tasks.
//!
//! The slave client never runs anything itself; it hands the task to a
//! runner and relays the outcome. Contract: the runner must honor the
//! cancellation token, a returned error is reported as a failed run, and
//! the output is opaque text.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hird_proto::payload::RunOptions;

/// Outcome of one run: opaque output text plus an optional run id the
/// implementation may assign (e.g. a coordinator run directory).
pub type RunResult = anyhow::Result<(String, Option<String>)>;

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        task: &str,
        options: &RunOptions,
        metadata: Option<&HashMap<String, serde_json::Value>>,
    ) -> RunResult;
}

// ── Subprocess runner ─────────────────────────────────────────────────────────

/// Runs each task by spawning a configured command with the task text on
/// stdin and capturing stdout. Cancellation kills the child.
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AgentRunner for CommandRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        task: &str,
        _options: &RunOptions,
        _metadata: Option<&HashMap<String, serde_json::Value>>,
    ) -> RunResult {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(task.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(program = %self.program, "runner canceled, killing child");
                let _ = child.kill().await;
                anyhow::bail!("run canceled")
            }
            result = async {
                let mut out_buf = Vec::new();
                let mut err_buf = Vec::new();
                let out_fut = async {
                    match stdout.as_mut() {
                        Some(o) => o.read_to_end(&mut out_buf).await,
                        None => Ok(0),
                    }
                };
                let err_fut = async {
                    match stderr.as_mut() {
                        Some(e) => e.read_to_end(&mut err_buf).await,
                        None => Ok(0),
                    }
                };
                let (status, _, _) = tokio::try_join!(child.wait(), out_fut, err_fut)?;
                Ok::<_, std::io::Error>((status, out_buf, err_buf))
            } => {
                let (status, out_buf, err_buf) = result?;
                if !status.success() {
                    let stderr = String::from_utf8_lossy(&err_buf);
                    anyhow::bail!(
                        "runner exited with {}: {}",
                        status,
                        stderr.trim()
                    );
                }
                Ok((String::from_utf8_lossy(&out_buf).into_owned(), None))
            }
        }
    }
}

// ── Mock runner ───────────────────────────────────────────────────────────────

/// Test double: echoes the task (or a fixed reply) after an optional delay,
/// honoring cancellation. No subprocess, no network.
#[derive(Default)]
pub struct MockRunner {
    pub reply: Option<String>,
    pub delay: std::time::Duration,
    pub fail_with: Option<String>,
}

#[async_trait]
impl AgentRunner for MockRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        task: &str,
        _options: &RunOptions,
        _metadata: Option<&HashMap<String, serde_json::Value>>,
    ) -> RunResult {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => anyhow::bail!("run canceled"),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        if let Some(err) = &self.fail_with {
            anyhow::bail!("{err}");
        }
        Ok((
            self.reply.clone().unwrap_or_else(|| task.to_string()),
            Some(format!("mock-{}", uuid::Uuid::new_v4())),
        ))
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_runner_echoes_task() {
        let runner = MockRunner::default();
        let cancel = CancellationToken::new();
        let (output, run_id) = runner
            .run(&cancel, "echo hello", &RunOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(output, "echo hello");
        assert!(run_id.unwrap().starts_with("mock-"));
    }

    #[tokio::test]
    async fn mock_runner_honors_cancellation() {
        let runner = MockRunner {
            delay: std::time::Duration::from_secs(30),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(runner
            .run(&cancel, "t", &RunOptions::default(), None)
            .await
            .is_err());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn command_runner_pipes_task_through() {
        let runner = CommandRunner::new("cat", vec![]);
        let cancel = CancellationToken::new();
        let (output, _) = runner
            .run(&cancel, "pass-through", &RunOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(output, "pass-through");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn command_runner_reports_nonzero_exit() {
        let runner = CommandRunner::new("false", vec![]);
        let cancel = CancellationToken::new();
        assert!(runner
            .run(&cancel, "t", &RunOptions::default(), None)
            .await
            .is_err());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn command_runner_cancellation_kills_child() {
        let runner = CommandRunner::new("sleep", vec!["30".into()]);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let start = std::time::Instant::now();
        assert!(runner
            .run(&cancel, "t", &RunOptions::default(), None)
            .await
            .is_err());
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }
}
