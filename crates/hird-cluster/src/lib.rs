// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The cluster transport and session layer.
//!
//! A master process accepts long-lived WebSocket connections from slave
//! nodes. Every connection starts with an HMAC-authenticated `register`
//! handshake, then settles into a duplex steady state: heartbeats and task
//! results flow up, task dispatches and file traffic flow both ways.
//!
//! ```text
//!   slave ──register{auth}──▶ master      verify → registry online
//!   slave ◀─register_ack────  master
//!   slave ──heartbeat───────▶ master      mark_seen + presence upsert
//!   slave ◀─agent.run───────  master      SendAgentRun (request matcher)
//!   slave ──agent.result────▶ master      delivered by request id
//!   either ◀─file.*─────────▶ either      transfer engine (hird-transfer)
//! ```
//!
//! The [`runner::AgentRunner`] trait is the capability boundary to the
//! actual agent implementation — this crate never executes tasks itself.

pub mod config;
mod error;
pub mod master;
mod pending;
mod presence;
mod registry;
pub mod runner;
mod session;
pub mod tls;
pub mod slave;

pub use config::{ClusterConfig, FilesConfig, TlsConfig};
pub use error::ClusterError;
pub use master::{MasterConfig, MasterGateway};
pub use pending::PendingRequests;
pub use presence::{KvPresence, KvStore, MemoryKv, NoopPresence, Presence};
pub use registry::{SlaveInfo, SlaveRegistry, SlaveStatus};
pub use runner::{AgentRunner, CommandRunner, MockRunner};
pub use session::{AxumSink, FrameSink, Session, TungsteniteSink};
pub use slave::{SlaveClient, SlaveConfig};

/// Shorthand result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
