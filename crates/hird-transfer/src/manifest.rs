// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Sidecar manifest written next to every completed inbound file.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// `<transfer_id>.manifest.json`, written beside the received file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferManifest {
    pub transfer_id: String,
    pub peer_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Path relative to the transfer root.
    pub saved_path: String,
    /// RFC 3339 receive timestamp.
    pub received_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl TransferManifest {
    /// Write the manifest atomically: tmp sibling + rename.
    pub fn write(&self, path: &Path) -> crate::Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "manifest.json".into());
        let tmp = path.with_file_name(format!(".tmp_json_{name}"));
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(serde_json::to_string_pretty(self).map_err(hird_proto::ProtoError::from)?.as_bytes())?;
            f.write_all(b"\n")?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text).map_err(hird_proto::ProtoError::from)?)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.manifest.json");
        let m = TransferManifest {
            transfer_id: "t1".into(),
            peer_id: "s1".into(),
            filename: "x.bin".into(),
            size_bytes: 1048576,
            sha256: "ab".repeat(32),
            saved_path: "inbox/s1/2026-08-01/t1__x.bin".into(),
            received_at: "2026-08-01T12:00:00Z".into(),
            metadata: None,
        };
        m.write(&path).unwrap();
        assert_eq!(TransferManifest::read(&path).unwrap(), m);
        // No stray temp file left behind.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
