// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Run manifests — one `run.json` per run directory.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `run.json` at the top of each run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Free-form metadata; the UI reads a `title` slot when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl RunManifest {
    /// The `title` metadata slot, when present.
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("title"))
            .and_then(|v| v.as_str())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_slot_is_read_from_metadata() {
        let mut meta = HashMap::new();
        meta.insert("title".to_string(), serde_json::json!("Nightly sweep"));
        let m = RunManifest {
            id: "run-1".into(),
            created_at: "2026-08-01T00:00:00Z".into(),
            metadata: Some(meta),
        };
        assert_eq!(m.title(), Some("Nightly sweep"));
    }

    #[test]
    fn missing_metadata_has_no_title() {
        let m = RunManifest {
            id: "run-1".into(),
            created_at: "2026-08-01T00:00:00Z".into(),
            metadata: None,
        };
        assert_eq!(m.title(), None);
    }
}
