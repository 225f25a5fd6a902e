// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The slave client — dials the master, registers, and serves inbound
//! task and file traffic until the connection drops.
//!
//! # Reconnect policy
//!
//! Exponential backoff from 1 s, doubling to a 30 s cap, with up to 500 ms
//! of jitter so a restarted master is not stampeded by its whole fleet at
//! once. A session that registered successfully resets the backoff.
//!
//! # Task dispatch
//!
//! `agent.run` requests are executed through the [`AgentRunner`]
//! capability under an inflight semaphore (default capacity 1). When
//! capacity is exhausted the slave answers `busy` immediately — tasks are
//! never queued on the slave side; queueing is the master's decision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::protocol::WebSocketConfig;
use uuid::Uuid;

use hird_proto::payload::{
    AgentResultPayload, AgentRunPayload, AuthPayload, RegisterAckPayload, RegisterPayload,
    RunStatus,
};
use hird_proto::{Envelope, MessageType};
use hird_transfer::TransferEngine;

use crate::runner::AgentRunner;
use crate::session::{Session, TungsteniteSink};

/// Peer label the slave files the master's transfers under.
const PEER_MASTER: &str = "master";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_JITTER_MILLIS: u64 = 500;

/// Budget for the `register_ack` after sending `register`.
const REGISTER_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the slave serves a pull request back to the master.
const PULL_SERVE_TIMEOUT: Duration = Duration::from_secs(900);

/// Remote run output is trimmed to this many characters before the reply.
const MAX_OUTPUT_CHARS: usize = 200_000;
const TRUNCATION_MARKER: &str = "\n…[output truncated]";

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SlaveConfig {
    /// Master WebSocket URL, e.g. `ws://127.0.0.1:18890/ws`.
    pub url: String,
    pub slave_id: String,
    /// Human name shown in the registry. Defaults to the hostname.
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub meta: HashMap<String, serde_json::Value>,
    /// Decoded shared secret.
    pub secret: Vec<u8>,
    /// Fallback cadence when the master does not negotiate one.
    pub heartbeat_interval: Duration,
    /// Concurrent `agent.run` capacity; excess is answered `busy`.
    pub max_inflight_runs: usize,
    /// Skip TLS certificate verification for `wss://` masters (advisory,
    /// for self-signed certs on trusted networks).
    pub insecure_skip_verify: bool,
    pub dial_timeout: Duration,
    pub max_message_bytes: usize,
}

impl SlaveConfig {
    pub fn new(url: impl Into<String>, slave_id: impl Into<String>, secret: Vec<u8>) -> Self {
        let name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "hird-slave".to_string());
        Self {
            url: url.into(),
            slave_id: slave_id.into(),
            name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Vec::new(),
            meta: HashMap::new(),
            secret,
            heartbeat_interval: Duration::from_secs(5),
            max_inflight_runs: 1,
            insecure_skip_verify: false,
            dial_timeout: Duration::from_secs(15),
            max_message_bytes: 4 * 1024 * 1024,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

enum SessionEnd {
    /// The connection ended after a successful registration.
    Clean,
    /// The parent context asked us to stop.
    Canceled,
}

pub struct SlaveClient {
    config: SlaveConfig,
    runner: Arc<dyn AgentRunner>,
    transfers: Arc<TransferEngine>,
    inflight: Arc<Semaphore>,
}

impl SlaveClient {
    pub fn new(
        config: SlaveConfig,
        runner: Arc<dyn AgentRunner>,
        transfers: Arc<TransferEngine>,
    ) -> Self {
        let inflight = Arc::new(Semaphore::new(config.max_inflight_runs.max(1)));
        Self {
            config,
            runner,
            transfers,
            inflight,
        }
    }

    /// Connect-loop: dial, register, serve; reconnect with capped backoff
    /// until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.run_session(&cancel).await {
                Ok(SessionEnd::Canceled) => return Ok(()),
                Ok(SessionEnd::Clean) => {
                    info!(url = %self.config.url, "session ended, will reconnect");
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    warn!(url = %self.config.url, "session failed: {e:#}");
                }
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MILLIS));
            let delay = backoff + jitter;
            debug!(?delay, "reconnect backoff");
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn run_session(&self, cancel: &CancellationToken) -> anyhow::Result<SessionEnd> {
        // ── Dial ──────────────────────────────────────────────────────────────
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_bytes);
        let connector = self.tls_connector()?;
        let (stream, _response) = tokio::time::timeout(
            self.config.dial_timeout,
            connect_async_tls_with_config(
                self.config.url.as_str(),
                Some(ws_config),
                false,
                connector,
            ),
        )
        .await
        .map_err(|_| anyhow::anyhow!("dial timed out after {:?}", self.config.dial_timeout))?
        .map_err(|e| anyhow::anyhow!("could not connect to {}: {e}", self.config.url))?;

        let (sink, mut reader) = stream.split();
        let session = Session::new(PEER_MASTER, Box::new(TungsteniteSink(sink)));

        // ── Register ──────────────────────────────────────────────────────────
        let ts = Utc::now().timestamp();
        let nonce = Uuid::new_v4().to_string();
        let sig = hird_auth::sign(&self.config.secret, &self.config.slave_id, ts, &nonce);
        let register = RegisterPayload {
            slave_id: self.config.slave_id.clone(),
            name: self.config.name.clone(),
            version: self.config.version.clone(),
            capabilities: self.config.capabilities.clone(),
            meta: self.config.meta.clone(),
            auth: AuthPayload { ts, nonce, sig },
        };
        session
            .write_envelope(&Envelope::from_payload(MessageType::Register, &register)?)
            .await?;

        let ack = tokio::time::timeout(REGISTER_ACK_TIMEOUT, await_register_ack(&mut reader))
            .await
            .map_err(|_| anyhow::anyhow!("no register_ack within {REGISTER_ACK_TIMEOUT:?}"))??;
        if !ack.accepted {
            anyhow::bail!(
                "registration rejected: {}",
                ack.reason.as_deref().unwrap_or("no reason given")
            );
        }
        let heartbeat = ack
            .heartbeat_interval_millis
            .map(Duration::from_millis)
            .filter(|d| !d.is_zero())
            .unwrap_or(self.config.heartbeat_interval);
        info!(
            slave = %self.config.slave_id,
            master = ack.server_instance_id.as_deref().unwrap_or("-"),
            ?heartbeat,
            "registered with master"
        );

        // ── Steady state ──────────────────────────────────────────────────────
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    session.close(1000, "shutting down").await;
                    return Ok(SessionEnd::Canceled);
                }
                _ = ticker.tick() => {
                    let hb = hird_proto::payload::HeartbeatPayload {
                        slave_id: Some(self.config.slave_id.clone()),
                    };
                    let env = Envelope::from_payload(MessageType::Heartbeat, &hb)?;
                    if session.write_envelope(&env).await.is_err() {
                        return Ok(SessionEnd::Clean);
                    }
                }
                frame = reader.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            match Envelope::unmarshal(&text) {
                                Ok(env) => self.dispatch(&session, env, cancel).await,
                                Err(e) => debug!("skipping malformed envelope: {e}"),
                            }
                        }
                        Some(Ok(tungstenite::Message::Binary(bytes))) => {
                            if let Err(e) = self
                                .transfers
                                .handle_chunk(PEER_MASTER, &bytes, session.as_ref())
                                .await
                            {
                                warn!("chunk handling error: {e}");
                            }
                        }
                        Some(Ok(tungstenite::Message::Close(_))) | None => {
                            return Ok(SessionEnd::Clean);
                        }
                        Some(Ok(_)) => {} // ping/pong handled by the protocol layer
                        Some(Err(e)) => {
                            debug!("read error: {e}");
                            return Ok(SessionEnd::Clean);
                        }
                    }
                }
            }
        }
    }

    fn tls_connector(&self) -> anyhow::Result<Option<Connector>> {
        if !self.config.url.starts_with("wss://") {
            return Ok(None);
        }
        let mut builder = native_tls::TlsConnector::builder();
        if self.config.insecure_skip_verify {
            warn!("TLS certificate verification disabled (insecure_skip_verify)");
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        Ok(Some(Connector::NativeTls(builder.build()?)))
    }

    async fn dispatch(&self, session: &Arc<Session>, env: Envelope, cancel: &CancellationToken) {
        match env.message_type() {
            MessageType::AgentRun => {
                let runner = self.runner.clone();
                let session = session.clone();
                let inflight = self.inflight.clone();
                let run_cancel = cancel.child_token();
                tokio::spawn(async move {
                    handle_agent_run(session, runner, inflight, run_cancel, env).await;
                });
            }

            MessageType::HeartbeatAck => {
                debug!("heartbeat acknowledged");
            }

            MessageType::FileOffer => {
                let tid = transfer_id_of(&env);
                if self.transfers.has_reply_waiter(&tid) {
                    self.transfers.deliver_reply(&tid, env);
                } else {
                    match env.parse_payload() {
                        Ok(offer) => {
                            if let Err(e) = self
                                .transfers
                                .handle_offer(PEER_MASTER, offer, session.as_ref())
                                .await
                            {
                                warn!("offer handling error: {e}");
                            }
                        }
                        Err(e) => debug!("malformed file.offer: {e}"),
                    }
                }
            }
            MessageType::FileAccept | MessageType::FileReject | MessageType::FileAck => {
                self.transfers.deliver_reply(&transfer_id_of(&env), env);
            }
            MessageType::FileComplete => {
                if let Ok(complete) = env.parse_payload() {
                    if let Err(e) = self
                        .transfers
                        .handle_complete(PEER_MASTER, complete, session.as_ref())
                        .await
                    {
                        warn!("complete handling error: {e}");
                    }
                }
            }
            MessageType::FileCancel => {
                if let Ok(cancel_payload) = env.parse_payload() {
                    if let Err(e) = self
                        .transfers
                        .handle_cancel(PEER_MASTER, cancel_payload, session.as_ref())
                        .await
                    {
                        warn!("cancel handling error: {e}");
                    }
                }
            }
            MessageType::FilePull => {
                if let Ok(pull) = env.parse_payload::<hird_proto::payload::FilePullPayload>() {
                    let transfers = self.transfers.clone();
                    let session = session.clone();
                    tokio::spawn(async move {
                        if let Err(e) = hird_transfer::serve_pull(
                            &transfers,
                            session.as_ref(),
                            &pull,
                            PULL_SERVE_TIMEOUT,
                        )
                        .await
                        {
                            warn!(transfer = %pull.transfer_id, "pull failed: {e}");
                            let reject = hird_proto::payload::FileRejectPayload {
                                transfer_id: pull.transfer_id.clone(),
                                reason: Some(e.to_string()),
                            };
                            if let Ok(env) =
                                Envelope::from_payload(MessageType::FileReject, &reject)
                            {
                                let _ = session.write_envelope(&env).await;
                            }
                        }
                    });
                }
            }

            other => {
                debug!(kind = %other, "ignoring unhandled message kind");
            }
        }
    }
}

// ── Task execution ────────────────────────────────────────────────────────────

async fn handle_agent_run(
    session: Arc<Session>,
    runner: Arc<dyn AgentRunner>,
    inflight: Arc<Semaphore>,
    run_cancel: CancellationToken,
    env: Envelope,
) {
    let reply = |payload: AgentResultPayload| {
        let session = session.clone();
        let request_id = env.id.clone();
        async move {
            match Envelope::reply_to(MessageType::AgentResult, &request_id, &payload) {
                Ok(reply) => {
                    if let Err(e) = session.write_envelope(&reply).await {
                        warn!(request = %request_id, "could not deliver agent.result: {e}");
                    }
                }
                Err(e) => warn!(request = %request_id, "agent.result encode failed: {e}"),
            }
        }
    };

    let payload: AgentRunPayload = match env.parse_payload() {
        Ok(p) => p,
        Err(e) => {
            reply(failed_result(None, format!("malformed agent.run: {e}"))).await;
            return;
        }
    };
    if payload.task.trim().is_empty() {
        reply(failed_result(None, "task must not be empty".into())).await;
        return;
    }

    // Capacity gate: immediate busy, never queue.
    let Ok(_permit) = inflight.try_acquire_owned() else {
        debug!(request = %env.id, "inflight capacity exhausted, answering busy");
        reply(AgentResultPayload {
            status: RunStatus::Busy,
            output: None,
            error: Some("max inflight runs reached".into()),
            duration_ms: Some(0),
            run_id: None,
        })
        .await;
        return;
    };

    let start = std::time::Instant::now();
    let deadline = payload
        .options
        .timeout_seconds
        .filter(|s| *s > 0)
        .map(Duration::from_secs);

    let run_future = runner.run(
        &run_cancel,
        &payload.task,
        &payload.options,
        payload.metadata.as_ref(),
    );
    let result = match deadline {
        Some(d) => {
            tokio::select! {
                r = run_future => r,
                _ = tokio::time::sleep(d) => {
                    run_cancel.cancel();
                    Err(anyhow::anyhow!("run deadline exceeded after {:?}", d))
                }
            }
        }
        None => run_future.await,
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let result_payload = match result {
        Ok((output, run_id)) => AgentResultPayload {
            status: RunStatus::Completed,
            output: Some(truncate_output(output)),
            error: None,
            duration_ms: Some(duration_ms),
            run_id,
        },
        Err(e) => failed_result(Some(duration_ms), format!("{e:#}")),
    };
    info!(
        request = %env.id,
        status = ?result_payload.status,
        duration_ms,
        "agent.run finished"
    );
    reply(result_payload).await;
}

fn failed_result(duration_ms: Option<u64>, error: String) -> AgentResultPayload {
    AgentResultPayload {
        status: RunStatus::Failed,
        output: None,
        error: Some(error),
        duration_ms,
        run_id: None,
    }
}

/// Trim to [`MAX_OUTPUT_CHARS`] characters, appending a marker if trimmed.
fn truncate_output(output: String) -> String {
    if output.chars().count() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut trimmed: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
    trimmed.push_str(TRUNCATION_MARKER);
    trimmed
}

// ── Handshake helper ──────────────────────────────────────────────────────────

async fn await_register_ack(
    reader: &mut futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>,
) -> anyhow::Result<RegisterAckPayload> {
    loop {
        match reader.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => {
                let env = match Envelope::unmarshal(&text) {
                    Ok(env) => env,
                    Err(e) => {
                        debug!("skipping malformed frame during handshake: {e}");
                        continue;
                    }
                };
                if env.message_type() == MessageType::RegisterAck {
                    return Ok(env.parse_payload()?);
                }
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                anyhow::bail!("connection closed during handshake: {frame:?}");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => anyhow::bail!("read error during handshake: {e}"),
            None => anyhow::bail!("connection ended during handshake"),
        }
    }
}

fn transfer_id_of(env: &Envelope) -> String {
    env.payload
        .get("transfer_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

// ── Unit tests ────────────────────────────────────────────────────────────────
