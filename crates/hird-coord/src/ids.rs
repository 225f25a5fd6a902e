// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Identifier rules for runs and agents.
//!
//! Ids become directory names, so they are restricted to `[A-Za-z0-9._-]`
//! with leading/trailing separators stripped. Defaults are timestamped for
//! runs (sortable in `ls`) and random for agents.

use chrono::Utc;
use rand::RngCore;

/// Restrict `raw` to `[A-Za-z0-9._-]`, replacing other characters with `-`
/// and stripping leading/trailing separators. Empty results yield `None`.
pub fn sanitize_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| matches!(c, '.' | '_' | '-'));
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// `run-YYYYMMDD-HHMMSS-<hex6>`
pub fn default_run_id() -> String {
    format!(
        "run-{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        random_hex(3)
    )
}

/// `agent-<hex8>`
pub fn default_agent_id() -> String {
    format!("agent-{}", random_hex(4))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_ids_pass_through() {
        assert_eq!(sanitize_id("run-1.2_a").as_deref(), Some("run-1.2_a"));
    }

    #[test]
    fn unsafe_chars_become_dashes() {
        assert_eq!(sanitize_id("my run/x").as_deref(), Some("my-run-x"));
    }

    #[test]
    fn leading_trailing_separators_are_stripped() {
        assert_eq!(sanitize_id("..sneaky..").as_deref(), Some("sneaky"));
        assert_eq!(sanitize_id("-_x_-").as_deref(), Some("x"));
    }

    #[test]
    fn empty_and_all_separator_ids_are_none() {
        assert_eq!(sanitize_id(""), None);
        assert_eq!(sanitize_id("..."), None);
        assert_eq!(sanitize_id("  "), None);
    }

    #[test]
    fn default_run_id_shape() {
        let id = default_run_id();
        assert!(id.starts_with("run-"), "got {id}");
        let hex_part = id.rsplit('-').next().unwrap();
        assert_eq!(hex_part.len(), 6);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn default_agent_id_shape() {
        let id = default_agent_id();
        assert!(id.starts_with("agent-"));
        assert_eq!(id.len(), "agent-".len() + 8);
    }

    #[test]
    fn default_ids_are_unique() {
        assert_ne!(default_agent_id(), default_agent_id());
    }
}
