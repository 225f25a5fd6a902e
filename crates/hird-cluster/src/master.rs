// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The master gateway — accepts slave connections and demultiplexes their
//! traffic.
//!
//! # Connection lifecycle
//!
//! ```text
//! accept → origin check → upgrade
//!        → read ONE text frame (≤10 s): must be `register`
//!        → HMAC verify (skew + nonce + constant-time sig)
//!        → registry.set_online (evicting any prior session, close 1008)
//!        → register_ack{accepted, heartbeat_interval_millis, server_instance_id}
//!        → steady-state reader loop
//! ```
//!
//! The reader loop is the only reader per connection; outbound traffic from
//! any number of callers is serialized by the session write lock. On
//! disconnect the
//! handler marks the slave offline (guarded — a stale handler never
//! clobbers a successor), clears presence, and aborts the peer's transfers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use futures::{stream::SplitStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hird_auth::Verifier;
use hird_proto::payload::{
    AgentResultPayload, AgentRunPayload, FileAckPayload, HeartbeatAckPayload, RegisterAckPayload,
    RegisterPayload,
};
use hird_proto::{Envelope, MessageType};
use hird_transfer::TransferEngine;

use crate::pending::PendingRequests;
use crate::presence::Presence;
use crate::registry::{SlaveInfo, SlaveRegistry, SlaveStatus};
use crate::session::{AxumSink, Session, CLOSE_POLICY_VIOLATION};
use crate::ClusterError;

/// How long the master serves a pull request back to a slave.
const PULL_SERVE_TIMEOUT: Duration = Duration::from_secs(900);

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// `host:port` to listen on. Default: loopback only.
    pub bind: String,
    /// Origin patterns (`*` wildcards). Empty list accepts any origin.
    pub accept_origins: Vec<String>,
    /// Explicit wildcard switch — overrides the pattern list.
    pub accept_origin_any: bool,
    /// Per-connection read limit. Default: 4 MiB.
    pub max_message_bytes: usize,
    /// Budget for the registration frame.
    pub handshake_timeout: Duration,
    /// Interval advertised to slaves in `register_ack`.
    pub heartbeat_interval: Duration,
    /// Answer heartbeats with `heartbeat_ack`.
    pub heartbeat_ack: bool,
    /// Presence record TTL. Keep ≥ 2× the heartbeat interval.
    pub presence_ttl: Duration,
    /// Accepted clock skew for registration timestamps.
    pub skew_seconds: i64,
    pub tls: crate::config::TlsConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:18890".to_string(),
            accept_origins: Vec::new(),
            accept_origin_any: false,
            max_message_bytes: 4 * 1024 * 1024,
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_ack: true,
            presence_ttl: Duration::from_secs(15),
            skew_seconds: hird_auth::DEFAULT_SKEW_SECONDS,
            tls: crate::config::TlsConfig::default(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────────

pub struct MasterGateway {
    config: MasterConfig,
    registry: Arc<SlaveRegistry>,
    presence: Arc<dyn Presence>,
    verifier: Verifier,
    pending: PendingRequests,
    transfers: Arc<TransferEngine>,
    server_instance_id: String,
    shutdown: CancellationToken,
}

impl MasterGateway {
    pub fn new(
        config: MasterConfig,
        secret: Vec<u8>,
        presence: Arc<dyn Presence>,
        transfers: Arc<TransferEngine>,
    ) -> Arc<Self> {
        let verifier = Verifier::new(secret, config.skew_seconds);
        Arc::new(Self {
            config,
            registry: Arc::new(SlaveRegistry::new()),
            presence,
            verifier,
            pending: PendingRequests::new(),
            transfers,
            server_instance_id: Uuid::new_v4().to_string(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &SlaveRegistry {
        &self.registry
    }

    pub fn transfers(&self) -> &Arc<TransferEngine> {
        &self.transfers
    }

    pub fn server_instance_id(&self) -> &str {
        &self.server_instance_id
    }

    /// Token canceled when [`MasterGateway::shutdown`] is called.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ── Serving ───────────────────────────────────────────────────────────────

    /// Bind `config.bind` and serve until shutdown. With `tls.enabled`, a
    /// certificate is loaded or generated and the endpoint speaks `wss://`.
    pub async fn serve(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.config.tls.enabled {
            return self.serve_tls().await;
        }
        let listener = tokio::net::TcpListener::bind(&self.config.bind).await?;
        info!(bind = %listener.local_addr()?, tls = false, "master gateway listening");
        self.serve_on(listener).await
    }

    /// Serve plain WebSocket on an already-bound listener (tests bind to
    /// port 0 and read the local addr back).
    pub async fn serve_on(self: &Arc<Self>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let app = self.router();
        let shutdown = self.shutdown.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
        self.presence.close().await;
        Ok(())
    }

    async fn serve_tls(self: &Arc<Self>) -> anyhow::Result<()> {
        let runtime = match (&self.config.tls.cert_path, &self.config.tls.key_path) {
            (Some(cert), Some(key)) => crate::tls::load_explicit(cert, key)?,
            _ => {
                let dir = self
                    .config
                    .tls
                    .cert_dir
                    .clone()
                    .unwrap_or_else(crate::config::default_cert_dir);
                crate::tls::load_or_generate(&dir)?
            }
        };
        let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &runtime.cert_path,
            &runtime.key_path,
        )
        .await?;

        let addr: SocketAddr = self
            .config
            .bind
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address {}: {e}", self.config.bind))?;
        info!(bind = %addr, tls = true, "master gateway listening");

        let handle = axum_server::Handle::new();
        let shutdown = self.shutdown.clone();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(
                self.router()
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        self.presence.close().await;
        Ok(())
    }

    fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.clone())
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.config.accept_origin_any || self.config.accept_origins.is_empty() {
            return true;
        }
        // Non-browser clients send no Origin header; they are not a
        // cross-origin vector and pass through.
        let Some(origin) = origin else { return true };
        self.config
            .accept_origins
            .iter()
            .any(|p| wildcard_match(p, origin))
    }

    // ── Connection handling ───────────────────────────────────────────────────

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, addr: SocketAddr) {
        let (sink, mut stream) = socket.split();
        let session = Session::new(addr.to_string(), Box::new(AxumSink(sink)));

        // Handshake: exactly one text frame, and it must be `register`.
        let register = match tokio::time::timeout(
            self.config.handshake_timeout,
            next_text(&mut stream),
        )
        .await
        {
            Err(_) => {
                warn!(%addr, "registration timed out");
                session.close(CLOSE_POLICY_VIOLATION, "registration timeout").await;
                return;
            }
            Ok(None) => return,
            Ok(Some(text)) => text,
        };

        let env = match Envelope::unmarshal(&register) {
            Ok(env) if env.message_type() == MessageType::Register => env,
            Ok(env) => {
                warn!(%addr, kind = %env.kind, "first frame was not register");
                session.close(CLOSE_POLICY_VIOLATION, "expected register").await;
                return;
            }
            Err(e) => {
                warn!(%addr, "malformed register envelope: {e}");
                session.close(CLOSE_POLICY_VIOLATION, "malformed envelope").await;
                return;
            }
        };

        let payload: RegisterPayload = match env.parse_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(%addr, "malformed register payload: {e}");
                session.close(CLOSE_POLICY_VIOLATION, "malformed register").await;
                return;
            }
        };

        let now = Utc::now();
        if self
            .verifier
            .verify(
                &payload.slave_id,
                payload.auth.ts,
                &payload.auth.nonce,
                &payload.auth.sig,
                now.timestamp(),
            )
            .is_err()
        {
            let nack = RegisterAckPayload {
                accepted: false,
                reason: Some("auth failed".into()),
                ..Default::default()
            };
            if let Ok(reply) = Envelope::reply_to(MessageType::RegisterAck, &env.id, &nack) {
                let _ = session.write_envelope(&reply).await;
            }
            session.close(CLOSE_POLICY_VIOLATION, "auth failed").await;
            return;
        }

        let slave_id = payload.slave_id.clone();
        let info = SlaveInfo {
            slave_id: slave_id.clone(),
            name: payload.name.clone(),
            version: payload.version.clone(),
            capabilities: payload.capabilities.clone(),
            meta: payload.meta.clone(),
            status: SlaveStatus::Online,
            remote_addr: addr.to_string(),
            connected_at: now,
            last_seen: now,
        };

        if let Some(evicted) = self.registry.set_online(info.clone(), session.clone()) {
            info!(slave = %slave_id, "evicting replaced session");
            evicted
                .close(CLOSE_POLICY_VIOLATION, "session replaced by new registration")
                .await;
        }
        self.presence
            .upsert(&info, &self.server_instance_id, self.config.presence_ttl)
            .await;

        let ack = RegisterAckPayload {
            accepted: true,
            reason: None,
            heartbeat_interval_millis: Some(self.config.heartbeat_interval.as_millis() as u64),
            server_instance_id: Some(self.server_instance_id.clone()),
        };
        match Envelope::reply_to(MessageType::RegisterAck, &env.id, &ack) {
            Ok(reply) => {
                if session.write_envelope(&reply).await.is_err() {
                    self.disconnect(&slave_id, &session).await;
                    return;
                }
            }
            Err(e) => {
                warn!(slave = %slave_id, "register_ack encode failed: {e}");
                self.disconnect(&slave_id, &session).await;
                return;
            }
        }
        info!(slave = %slave_id, %addr, name = %payload.name, "slave registered");

        // Steady state: single reader, dispatch by frame type.
        self.reader_loop(&slave_id, &session, &mut stream).await;
        self.disconnect(&slave_id, &session).await;
    }

    async fn reader_loop(
        self: &Arc<Self>,
        slave_id: &str,
        session: &Arc<Session>,
        stream: &mut SplitStream<WebSocket>,
    ) {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = stream.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    let env = match Envelope::unmarshal(&text) {
                        Ok(env) => env,
                        Err(e) => {
                            debug!(slave = slave_id, "skipping malformed envelope: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = self.dispatch(slave_id, session, env).await {
                        warn!(slave = slave_id, "dispatch error: {e}");
                    }
                }
                Some(Ok(Message::Binary(frame))) => {
                    if let Err(e) = self
                        .transfers
                        .handle_chunk(slave_id, &frame, session.as_ref())
                        .await
                    {
                        warn!(slave = slave_id, "chunk handling error: {e}");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong handled by the protocol layer
                Some(Err(e)) => {
                    debug!(slave = slave_id, "read error: {e}");
                    break;
                }
            }
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        slave_id: &str,
        session: &Arc<Session>,
        env: Envelope,
    ) -> anyhow::Result<()> {
        match env.message_type() {
            MessageType::Heartbeat => {
                let now = Utc::now();
                self.registry.mark_seen(slave_id, now);
                if let Some(info) = self.registry.get(slave_id) {
                    self.presence
                        .upsert(&info, &self.server_instance_id, self.config.presence_ttl)
                        .await;
                }
                if self.config.heartbeat_ack {
                    let ack = HeartbeatAckPayload {
                        server_time_unix: now.timestamp(),
                    };
                    let reply = Envelope::reply_to(MessageType::HeartbeatAck, &env.id, &ack)?;
                    session.write_envelope(&reply).await?;
                }
            }

            MessageType::AgentResult => {
                // The envelope id IS the request id; at-most-once delivery.
                let request_id = env.id.clone();
                self.pending.deliver(&request_id, env);
            }

            MessageType::FileOffer => {
                let tid = transfer_id_of(&env);
                if self.transfers.has_reply_waiter(&tid) {
                    // An offer answering our pending pull.
                    self.transfers.deliver_reply(&tid, env);
                } else {
                    let offer = env.parse_payload()?;
                    self.transfers
                        .handle_offer(slave_id, offer, session.as_ref())
                        .await?;
                }
            }
            MessageType::FileAccept | MessageType::FileReject | MessageType::FileAck => {
                self.transfers.deliver_reply(&transfer_id_of(&env), env);
            }
            MessageType::FileComplete => {
                let complete = env.parse_payload()?;
                self.transfers
                    .handle_complete(slave_id, complete, session.as_ref())
                    .await?;
            }
            MessageType::FileCancel => {
                let cancel = env.parse_payload()?;
                self.transfers
                    .handle_cancel(slave_id, cancel, session.as_ref())
                    .await?;
            }
            MessageType::FilePull => {
                // The peer wants a file from us: act as push initiator.
                let pull: hird_proto::payload::FilePullPayload = env.parse_payload()?;
                let transfers = self.transfers.clone();
                let session = session.clone();
                let slave = slave_id.to_string();
                tokio::spawn(async move {
                    match hird_transfer::serve_pull(
                        &transfers,
                        session.as_ref(),
                        &pull,
                        PULL_SERVE_TIMEOUT,
                    )
                    .await
                    {
                        Ok(ack) => {
                            debug!(slave = %slave, transfer = %pull.transfer_id, status = ?ack.status, "pull served")
                        }
                        Err(e) => {
                            warn!(slave = %slave, transfer = %pull.transfer_id, "pull failed: {e}");
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
                    }
                });
            }

            MessageType::Register => {
                // Registering twice on one connection is a protocol error.
                warn!(slave = slave_id, "unexpected register in steady state");
                session
                    .close(CLOSE_POLICY_VIOLATION, "unexpected register")
                    .await;
            }
            other => {
                debug!(slave = slave_id, kind = %other, "ignoring unhandled message kind");
            }
        }
        Ok(())
    }

    async fn disconnect(&self, slave_id: &str, session: &Arc<Session>) {
        let owned = self.registry.set_offline(slave_id, session, Utc::now());
        if owned {
            self.presence.delete(slave_id).await;
        }
        self.transfers.abort_peer(slave_id, "session closed");
        info!(slave = slave_id, owned_session = owned, "slave disconnected");
    }

    // ── Outbound calls ────────────────────────────────────────────────────────

    /// Dispatch a task to a slave and wait for the matching `agent.result`.
    pub async fn send_agent_run(
        &self,
        slave_id: &str,
        payload: AgentRunPayload,
        timeout: Duration,
    ) -> crate::Result<AgentResultPayload> {
        let session = self
            .registry
            .session_of(slave_id)
            .ok_or_else(|| ClusterError::Offline(slave_id.to_string()))?;

        let request_id = Uuid::new_v4().to_string();
        let mut rx = self.pending.register(&request_id);
        // Cleanup on every exit path, including caller cancellation by drop.
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: request_id.clone(),
        };

        let env = Envelope::reply_to(MessageType::AgentRun, &request_id, &payload)?;
        session
            .write_envelope(&env)
            .await
            .map_err(|e| ClusterError::Wire(e.to_string()))?;

        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_) => Err(ClusterError::Timeout),
            Ok(None) => Err(ClusterError::Canceled),
            Ok(Some(reply)) => Ok(reply.parse_payload()?),
        }
    }

    /// Push a local file to a slave over its live session.
    pub async fn push_file_to(
        &self,
        slave_id: &str,
        local_path: &std::path::Path,
        timeout: Duration,
    ) -> crate::Result<FileAckPayload> {
        let session = self
            .registry
            .session_of(slave_id)
            .ok_or_else(|| ClusterError::Offline(slave_id.to_string()))?;
        Ok(hird_transfer::push_file(&self.transfers, session.as_ref(), local_path, timeout).await?)
    }

    /// Pull a file from a slave into the master's transfer root.
    pub async fn pull_file_from(
        &self,
        slave_id: &str,
        remote_path: &str,
        timeout: Duration,
    ) -> crate::Result<std::path::PathBuf> {
        let session = self
            .registry
            .session_of(slave_id)
            .ok_or_else(|| ClusterError::Offline(slave_id.to_string()))?;
        Ok(hird_transfer::pull_file(
            &self.transfers,
            session.as_ref(),
            slave_id,
            remote_path,
            timeout,
        )
        .await?)
    }
}

/// Deregisters the pending-request slot when the call ends — normally or by
/// drop.
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.deregister(&self.request_id);
    }
}

// ── HTTP handler ──────────────────────────────────────────────────────────────

async fn ws_handler(
    State(gateway): State<Arc<MasterGateway>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !gateway.origin_allowed(origin) {
        warn!(%addr, ?origin, "origin rejected");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let max = gateway.config.max_message_bytes;
    ws.max_message_size(max)
        .on_upgrade(move |socket| gateway.handle_socket(socket, addr))
}

async fn next_text(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Some(text),
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return None,
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

/// `*`-wildcard pattern match, anchored at both ends.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let mut rest = value;
    let mut first = true;
    let segments: Vec<&str> = pattern.split('*').collect();
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            first = false;
            continue;
        }
        if first {
            // No leading '*': must match at the start.
            if !rest.starts_with(seg) {
                return false;
            }
            rest = &rest[seg.len()..];
            first = false;
        } else if i == segments.len() - 1 {
            // No trailing '*': must match at the end.
            if !rest.ends_with(seg) {
                return false;
            }
            return true;
        } else {
            match rest.find(seg) {
                Some(idx) => rest = &rest[idx + seg.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with '*' (or consumed everything).
    pattern.ends_with('*') || rest.is_empty()
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::NoopPresence;
    use hird_transfer::TransferLimits;

    fn gateway_with(config: MasterConfig) -> (tempfile::TempDir, Arc<MasterGateway>) {
        let dir = tempfile::tempdir().unwrap();
        let transfers = Arc::new(
            TransferEngine::new(dir.path().join("files"), TransferLimits::default()).unwrap(),
        );
        let gw = MasterGateway::new(
            config,
            b"0123456789abcdef".to_vec(),
            Arc::new(NoopPresence),
            transfers,
        );
        (dir, gw)
    }

    #[test]
    fn default_bind_is_loopback() {
        let c = MasterConfig::default();
        assert!(c.bind.starts_with("127.0.0.1"), "default must be loopback-only");
    }

    #[test]
    fn presence_ttl_covers_two_heartbeats() {
        let c = MasterConfig::default();
        assert!(c.presence_ttl >= 2 * c.heartbeat_interval);
    }

    #[test]
    fn empty_origin_list_accepts_anything() {
        let (_tmp, gw) = gateway_with(MasterConfig::default());
        assert!(gw.origin_allowed(Some("https://anywhere.example")));
        assert!(gw.origin_allowed(None));
    }

    #[test]
    fn origin_patterns_filter() {
        let (_tmp, gw) = gateway_with(MasterConfig {
            accept_origins: vec!["https://*.example.com".into()],
            ..Default::default()
        });
        assert!(gw.origin_allowed(Some("https://ops.example.com")));
        assert!(!gw.origin_allowed(Some("https://evil.net")));
        // Non-browser clients without an Origin pass.
        assert!(gw.origin_allowed(None));
    }

    #[test]
    fn accept_origin_any_overrides_patterns() {
        let (_tmp, gw) = gateway_with(MasterConfig {
            accept_origins: vec!["https://only.example".into()],
            accept_origin_any: true,
            ..Default::default()
        });
        assert!(gw.origin_allowed(Some("https://evil.net")));
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("https://a.example", "https://a.example"));
        assert!(!wildcard_match("https://a.example", "https://b.example"));
        assert!(wildcard_match("https://*.example", "https://x.example"));
        assert!(!wildcard_match("https://*.example", "https://x.example.net"));
        assert!(wildcard_match("https://x.*", "https://x.anything"));
        assert!(wildcard_match("*example*", "my-example-origin"));
        assert!(!wildcard_match("*example*", "nothing-here"));
    }

    #[tokio::test]
    async fn send_agent_run_to_offline_slave_errors_immediately() {
        let (_tmp, gw) = gateway_with(MasterConfig::default());
        let err = gw
            .send_agent_run(
                "ghost",
                AgentRunPayload {
                    task: "noop".into(),
                    ..Default::default()
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Offline(_)));
        assert!(gw.pending.is_empty(), "matcher entry cleaned up");
    }

    #[test]
    fn server_instance_ids_are_unique() {
        let (_ta, a) = gateway_with(MasterConfig::default());
        let (_tb, b) = gateway_with(MasterConfig::default());
        assert_ne!(a.server_instance_id(), b.server_instance_id());
    }
}
