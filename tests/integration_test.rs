// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end cluster tests: a real master gateway and a real slave client
//! talking over loopback WebSockets.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use hird_cluster::{
    MasterConfig, MasterGateway, MockRunner, NoopPresence, SlaveClient, SlaveConfig,
};
use hird_proto::payload::{
    AgentResultPayload, AgentRunPayload, AuthPayload, RegisterAckPayload, RegisterPayload,
    RunStatus, TransferStatus,
};
use hird_proto::{Envelope, MessageType};
use hird_transfer::{TransferEngine, TransferLimits};

const SECRET: &[u8] = b"integration-test-secret-32bytes!";

struct Cluster {
    gateway: Arc<MasterGateway>,
    url: String,
    #[allow(dead_code)]
    master_dir: tempfile::TempDir,
    slave_dir: tempfile::TempDir,
    cancel: CancellationToken,
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.gateway.shutdown();
    }
}

/// Boot a master on an ephemeral port and connect one slave to it.
async fn boot_cluster(slave_id: &str, runner: MockRunner, max_inflight: usize) -> Cluster {
    let master_dir = tempfile::tempdir().unwrap();
    let slave_dir = tempfile::tempdir().unwrap();

    let master_engine = Arc::new(
        TransferEngine::new(master_dir.path().join("files"), TransferLimits::default()).unwrap(),
    );
    let gateway = MasterGateway::new(
        MasterConfig::default(),
        SECRET.to_vec(),
        Arc::new(NoopPresence),
        master_engine,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("ws://{addr}/ws");

    let serving = gateway.clone();
    tokio::spawn(async move {
        let _ = serving.serve_on(listener).await;
    });

    let slave_engine = Arc::new(
        TransferEngine::new(slave_dir.path().join("files"), TransferLimits::default()).unwrap(),
    );
    let mut slave_config = SlaveConfig::new(url.clone(), slave_id, SECRET.to_vec());
    slave_config.max_inflight_runs = max_inflight;
    let client = SlaveClient::new(slave_config, Arc::new(runner), slave_engine);

    let cancel = CancellationToken::new();
    let client_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = client.run(client_cancel).await;
    });

    // Wait for the registration to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if gateway.registry().session_of(slave_id).is_some() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "slave never registered"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    Cluster {
        gateway,
        url,
        master_dir,
        slave_dir,
        cancel,
    }
}

fn run_payload(task: &str) -> AgentRunPayload {
    AgentRunPayload {
        task: task.into(),
        ..Default::default()
    }
}

/// Open a raw WebSocket, send one register frame, and return the ack (or
/// `None` when the master closes without one).
async fn send_register(url: &str, text: String) -> Option<RegisterAckPayload> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws.send(tungstenite::Message::Text(text)).await.unwrap();
    loop {
        match ws.next().await {
            Some(Ok(tungstenite::Message::Text(reply))) => {
                let env = Envelope::unmarshal(&reply).unwrap();
                return Some(env.parse_payload().unwrap());
            }
            Some(Ok(tungstenite::Message::Close(_))) | None => return None,
            _ => continue,
        }
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn slave_registers_and_shows_online() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    let info = cluster.gateway.registry().get("s1").unwrap();
    assert_eq!(info.slave_id, "s1");
    assert!(!info.name.is_empty());
    let online = cluster.gateway.registry().snapshot(true);
    assert_eq!(online.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn replayed_register_is_rejected() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    // Hand-roll a register envelope and send it on two fresh connections.
    let ts = chrono::Utc::now().timestamp();
    let nonce = "replayed-nonce-1";
    let sig = hird_auth::sign(SECRET, "s2", ts, nonce);
    let register = Envelope::from_payload(
        MessageType::Register,
        &RegisterPayload {
            slave_id: "s2".into(),
            auth: AuthPayload {
                ts,
                nonce: nonce.into(),
                sig,
            },
            ..Default::default()
        },
    )
    .unwrap();
    let frame = register.marshal().unwrap();

    let first = send_register(&cluster.url, frame.clone())
        .await
        .expect("first register gets an ack");
    assert!(first.accepted, "fresh nonce must be accepted");

    let second = send_register(&cluster.url, frame).await;
    match second {
        // Either an explicit nack or a policy close before any ack.
        Some(ack) => {
            assert!(!ack.accepted);
            assert_eq!(ack.reason.as_deref(), Some("auth failed"));
        }
        None => {}
    }
}

// ── Task round-trip ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn task_round_trip_returns_output() {
    let runner = MockRunner {
        reply: Some("hello".into()),
        ..Default::default()
    };
    let cluster = boot_cluster("s1", runner, 1).await;

    let result: AgentResultPayload = cluster
        .gateway
        .send_agent_run("s1", run_payload("echo hello"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output.as_deref(), Some("hello"));
    assert!(result.run_id.is_some());
    assert!(result.duration_ms.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn capacity_exhaustion_answers_busy() {
    let runner = MockRunner {
        delay: Duration::from_millis(500),
        ..Default::default()
    };
    let cluster = boot_cluster("s1", runner, 1).await;

    let a = cluster
        .gateway
        .send_agent_run("s1", run_payload("slow one"), Duration::from_secs(5));
    let b = async {
        // Let the first request win the single slot.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cluster
            .gateway
            .send_agent_run("s1", run_payload("crowded out"), Duration::from_secs(5))
            .await
    };
    let (first, second) = tokio::join!(a, b);

    assert_eq!(first.unwrap().status, RunStatus::Completed);
    let second = second.unwrap();
    assert_eq!(second.status, RunStatus::Busy);
    assert!(second.error.unwrap().contains("inflight"));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_task_fails_fast() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    let result = cluster
        .gateway
        .send_agent_run("s1", run_payload("   "), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().contains("empty"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_runner_reports_failed() {
    let runner = MockRunner {
        fail_with: Some("model exploded".into()),
        ..Default::default()
    };
    let cluster = boot_cluster("s1", runner, 1).await;

    let result = cluster
        .gateway
        .send_agent_run("s1", run_payload("doomed"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().contains("model exploded"));
}

// ── File transfer ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn push_file_lands_in_slave_inbox_with_manifest() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    let body: Vec<u8> = (0..1_048_576u32).map(|i| (i % 251) as u8).collect();
    let src = cluster.master_dir.path().join("files/outbox/x.bin");
    std::fs::write(&src, &body).unwrap();

    let ack = cluster
        .gateway
        .push_file_to("s1", &src, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(ack.status, TransferStatus::Completed);
    assert_eq!(ack.bytes_received, Some(body.len() as u64));

    let saved_rel = ack.saved_path.unwrap();
    assert!(saved_rel.starts_with("inbox/master/"));
    assert!(saved_rel.ends_with("__x.bin"));

    let saved = cluster.slave_dir.path().join("files").join(&saved_rel);
    assert_eq!(std::fs::read(&saved).unwrap(), body);

    // Sibling manifest records the same hash the ack reported.
    let manifest_path = saved
        .parent()
        .unwrap()
        .join(format!("{}.manifest.json", ack.transfer_id));
    let manifest = hird_transfer::TransferManifest::read(&manifest_path).unwrap();
    assert_eq!(Some(manifest.sha256), ack.sha256);
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_file_returns_local_path() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    let body = b"pulled across the wire".to_vec();
    let remote = cluster.slave_dir.path().join("files/outbox/report.txt");
    std::fs::write(&remote, &body).unwrap();

    let local = cluster
        .gateway
        .pull_file_from("s1", "outbox/report.txt", Duration::from_secs(10))
        .await
        .unwrap();

    assert!(local.starts_with(cluster.master_dir.path().join("files")));
    assert_eq!(std::fs::read(&local).unwrap(), body);
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_of_escaping_path_fails() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    let err = cluster
        .gateway
        .pull_file_from("s1", "../../etc/passwd", Duration::from_secs(5))
        .await
        .unwrap_err();
    // The slave refuses to serve the path; the requester sees a failure,
    // never a file.
    assert!(!format!("{err}").is_empty());
}

// ── Offline behavior ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn disconnected_slave_goes_offline_and_calls_fail() {
    let cluster = boot_cluster("s1", MockRunner::default(), 1).await;

    // Stop the slave; the master notices the disconnect.
    cluster.cancel.cancel();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if cluster.gateway.registry().session_of("s1").is_none() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "slave never went offline"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let err = cluster
        .gateway
        .send_agent_run("s1", run_payload("too late"), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, hird_cluster::ClusterError::Offline(_)));
}
