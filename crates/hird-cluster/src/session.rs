// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! One authenticated duplex connection, write side.
//!
//! Both WebSocket stacks in play (axum on the accepting master, tungstenite
//! on the dialing slave) are **not** write-safe from concurrent writers, so
//! every session funnels its outbound frames through one async mutex. Reads
//! never go through a [`Session`] — the owning handler loop is the single
//! reader per connection.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame as AxumCloseFrame, Message as AxumMessage, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use uuid::Uuid;

use hird_proto::Envelope;

/// WebSocket close code for policy violations (RFC 6455 §7.4.1).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Abstraction over the write half of a duplex frame-typed channel.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;
    async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()>;
    async fn close(&mut self, code: u16, reason: &str) -> anyhow::Result<()>;
}

/// Write half of an accepted axum WebSocket.
pub struct AxumSink(pub SplitSink<WebSocket, AxumMessage>);

#[async_trait]
impl FrameSink for AxumSink {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        Ok(self.0.send(AxumMessage::Text(text)).await?)
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        Ok(self.0.send(AxumMessage::Binary(bytes)).await?)
    }

    async fn close(&mut self, code: u16, reason: &str) -> anyhow::Result<()> {
        let frame = AxumCloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        Ok(self.0.send(AxumMessage::Close(Some(frame))).await?)
    }
}

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a dialed tungstenite WebSocket.
pub struct TungsteniteSink(pub SplitSink<ClientStream, tungstenite::Message>);

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        Ok(self.0.send(tungstenite::Message::Text(text)).await?)
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        Ok(self.0.send(tungstenite::Message::Binary(bytes)).await?)
    }

    async fn close(&mut self, code: u16, reason: &str) -> anyhow::Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        Ok(self.0.send(tungstenite::Message::Close(Some(frame))).await?)
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// The shared write handle for one connection.
pub struct Session {
    id: Uuid,
    peer: String,
    sink: Mutex<Box<dyn FrameSink>>,
}

impl Session {
    pub fn new(peer: impl Into<String>, sink: Box<dyn FrameSink>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            sink: Mutex::new(sink),
        })
    }

    /// Unique id of this session instance. Used by the registry to guard
    /// against a stale handler clobbering its successor's state.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn write_text(&self, text: String) -> anyhow::Result<()> {
        self.sink.lock().await.send_text(text).await
    }

    pub async fn write_binary(&self, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.sink.lock().await.send_binary(bytes).await
    }

    pub async fn write_envelope(&self, env: &Envelope) -> anyhow::Result<()> {
        self.write_text(env.marshal()?).await
    }

    pub async fn close(&self, code: u16, reason: &str) {
        if let Err(e) = self.sink.lock().await.close(code, reason).await {
            debug!(peer = %self.peer, "close frame not delivered: {e}");
        }
    }
}

#[async_trait]
impl hird_transfer::WireSender for Session {
    async fn send_envelope(&self, env: Envelope) -> anyhow::Result<()> {
        self.write_envelope(&env).await
    }

    async fn send_binary(&self, frame: Vec<u8>) -> anyhow::Result<()> {
        self.write_binary(frame).await
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hird_proto::MessageType;

    /// Sink that records frames for assertions.
    struct RecordingSink {
        texts: Vec<String>,
        binaries: Vec<Vec<u8>>,
        closed: Option<(u16, String)>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
            self.texts.push(text);
            Ok(())
        }
        async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
            self.binaries.push(bytes);
            Ok(())
        }
        async fn close(&mut self, code: u16, reason: &str) -> anyhow::Result<()> {
            self.closed = Some((code, reason.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_are_serialized_through_one_sink() {
        let session = Session::new(
            "test-peer",
            Box::new(RecordingSink {
                texts: vec![],
                binaries: vec![],
                closed: None,
            }),
        );

        let env = Envelope::new(MessageType::Heartbeat, serde_json::json!({}));
        session.write_envelope(&env).await.unwrap();
        session.write_binary(vec![1, 2, 3]).await.unwrap();

        // Concurrent writers contend on the mutex but all frames land.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = session.clone();
            handles.push(tokio::spawn(async move {
                s.write_text("x".into()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[test]
    fn sessions_have_distinct_ids() {
        let a = Session::new(
            "p",
            Box::new(RecordingSink {
                texts: vec![],
                binaries: vec![],
                closed: None,
            }),
        );
        let b = Session::new(
            "p",
            Box::new(RecordingSink {
                texts: vec![],
                binaries: vec![],
                closed: None,
            }),
        );
        assert_ne!(a.id(), b.id());
    }
}
