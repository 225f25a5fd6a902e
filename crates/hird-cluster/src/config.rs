// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Cluster configuration, persisted as JSON.
//!
//! ```json
//! {
//!   "cluster": {
//!     "secret": "<base64, 32 bytes>",
//!     "tls": { "enabled": false, "cert_dir": null, "insecure_skip_verify": false },
//!     "files": {
//!       "root_dir": null,
//!       "max_file_bytes": 0,
//!       "max_total_bytes": 0,
//!       "retention_days": 0,
//!       "chunk_size_bytes": 0,
//!       "max_inflight_chunks": 0
//!     }
//!   }
//! }
//! ```
//!
//! Zero/missing fields mean "use the default". The shared secret is base64;
//! [`ensure_secret`] generates one on first use and rewrites the file
//! atomically, so a fresh install needs no manual key ceremony.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hird_transfer::TransferLimits;

/// Top-level config document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub cluster: ClusterSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSection {
    /// Shared HMAC secret, base64-encoded. Must decode to ≥ 16 bytes.
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub files: FilesConfig,
}

/// Transport TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Serve `wss://` on the master. A self-signed ECDSA P-256 certificate
    /// is generated into `cert_dir` when no cert/key pair is configured.
    #[serde(default)]
    pub enabled: bool,

    /// Explicit certificate/key pair (PEM). Used when both are set.
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,

    /// Where generated certificates live. Default: `~/.config/hird/tls`.
    pub cert_dir: Option<PathBuf>,

    /// Slave side: skip certificate verification when dialing `wss://`.
    /// Advisory — for self-signed masters on trusted networks only.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// File-transfer limits. Zero means "default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Transfer root. Default: `~/.local/share/hird/files`.
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub max_total_bytes: u64,
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default)]
    pub chunk_size_bytes: u64,
    #[serde(default)]
    pub max_inflight_chunks: u32,
}

impl FilesConfig {
    /// Resolve against the built-in defaults.
    pub fn limits(&self) -> TransferLimits {
        let d = TransferLimits::default();
        TransferLimits {
            max_file_bytes: nz(self.max_file_bytes, d.max_file_bytes),
            max_total_bytes: nz(self.max_total_bytes, d.max_total_bytes),
            retention_days: if self.retention_days == 0 {
                d.retention_days
            } else {
                self.retention_days
            },
            chunk_size_bytes: nz(self.chunk_size_bytes, d.chunk_size_bytes),
            max_inflight_chunks: if self.max_inflight_chunks == 0 {
                d.max_inflight_chunks
            } else {
                self.max_inflight_chunks
            },
        }
    }

    pub fn root_dir(&self) -> PathBuf {
        self.root_dir.clone().unwrap_or_else(default_files_root)
    }
}

fn nz(v: u64, default: u64) -> u64 {
    if v == 0 {
        default
    } else {
        v
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/hird/cluster.json")
}

fn default_files_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("hird")
        .join("files")
}

pub fn default_cert_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/hird/tls")
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load the cluster config. A missing file yields pure defaults (with an
/// empty secret — call [`ensure_secret`] before starting anything that
/// authenticates).
pub fn load(path: Option<&Path>) -> anyhow::Result<ClusterConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.is_file() {
        debug!(path = %path.display(), "no cluster config, using defaults");
        return Ok(ClusterConfig::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load the config and make sure it carries a usable secret.
///
/// When the stored secret is empty or undecodable, a fresh 32-byte secret
/// is generated and the whole file is rewritten atomically (0o600 on Unix).
/// Returns the config and the decoded secret bytes.
pub fn ensure_secret(path: Option<&Path>) -> anyhow::Result<(ClusterConfig, Vec<u8>)> {
    let path_buf = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let mut config = load(Some(&path_buf))?;

    match hird_auth::decode_secret(&config.cluster.secret) {
        Ok(bytes) => Ok((config, bytes)),
        Err(e) => {
            debug!("generating cluster secret ({e})");
            config.cluster.secret = hird_auth::generate_secret();
            let bytes = hird_auth::decode_secret(&config.cluster.secret)
                .expect("freshly generated secret must decode");
            write_config_atomic(&path_buf, &config)?;
            info!(path = %path_buf.display(), "generated new cluster secret");
            Ok((config, bytes))
        }
    }
}

fn write_config_atomic(path: &Path, config: &ClusterConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(config).context("serializing cluster config")?;
    let tmp = path.with_file_name(format!(
        ".tmp_json_{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "cluster.json".into())
    ));
    write_secret_file(&tmp, json.as_bytes())?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing config file {}", path.display()))?;
    Ok(())
}

/// Write `data` to `path` with mode 0o600 on Unix (owner-read/write only).
fn write_secret_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("writing secret file {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)
            .with_context(|| format!("writing secret file {}", path.display()))?;
    }
    Ok(())
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(&dir.path().join("nope.json"))).unwrap();
        assert!(config.cluster.secret.is_empty());
        assert!(!config.cluster.tls.enabled);
    }

    #[test]
    fn zero_file_limits_resolve_to_defaults() {
        let files = FilesConfig::default();
        let limits = files.limits();
        assert_eq!(limits.max_file_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(limits.max_total_bytes, 20 * 1024 * 1024 * 1024);
        assert_eq!(limits.retention_days, 7);
        assert_eq!(limits.chunk_size_bytes, 256 * 1024);
        assert_eq!(limits.max_inflight_chunks, 8);
    }

    #[test]
    fn explicit_file_limits_are_kept() {
        let files = FilesConfig {
            max_file_bytes: 1024,
            retention_days: 30,
            ..Default::default()
        };
        let limits = files.limits();
        assert_eq!(limits.max_file_bytes, 1024);
        assert_eq!(limits.retention_days, 30);
        assert_eq!(limits.chunk_size_bytes, 256 * 1024, "unset stays default");
    }

    #[test]
    fn ensure_secret_generates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");

        let (config, bytes) = ensure_secret(Some(&path)).unwrap();
        assert_eq!(bytes.len(), 32);
        assert!(!config.cluster.secret.is_empty());
        assert!(path.exists());

        // Second call reuses the stored secret.
        let (config2, bytes2) = ensure_secret(Some(&path)).unwrap();
        assert_eq!(config.cluster.secret, config2.cluster.secret);
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn ensure_secret_replaces_invalid_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, r#"{"cluster": {"secret": "dG9vc2hvcnQ="}}"#).unwrap();

        let (_config, bytes) = ensure_secret(Some(&path)).unwrap();
        assert_eq!(bytes.len(), 32, "too-short secret must be replaced");
    }

    #[test]
    #[cfg(unix)]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        ensure_secret(Some(&path)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "secret-bearing config must be 0600, got {mode:03o}");
    }

    #[test]
    fn config_json_round_trip() {
        let mut config = ClusterConfig::default();
        config.cluster.secret = "c2VjcmV0".into();
        config.cluster.tls.enabled = true;
        let json = serde_json::to_string(&config).unwrap();
        let back: ClusterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cluster.secret, config.cluster.secret);
        assert!(back.cluster.tls.enabled);
    }

    #[test]
    fn nested_layout_parses() {
        let json = r#"{"cluster": {"files": {"max_file_bytes": 4096}}}"#;
        let config: ClusterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cluster.files.max_file_bytes, 4096);
        assert!(config.cluster.secret.is_empty());
    }
}
