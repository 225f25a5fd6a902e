// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Path safety for peer-supplied names.
//!
//! Everything a peer sends that ends up in a filesystem path goes through
//! one of two chokepoints: [`safe_join`] for relative paths (pull requests,
//! save hints) and [`sanitize_filename`] for single path components
//! (filenames, peer ids).

use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Join `rel` onto `root`, rejecting anything that could escape it.
///
/// Rejected outright: absolute paths, paths containing `:` (Windows drive
/// and ADS syntax), and any `..` sequence that would climb above `root`.
/// The result is compared against the canonicalized root as a final guard.
pub fn safe_join(root: &Path, rel: &str) -> crate::Result<PathBuf> {
    if rel.contains(':') {
        return Err(TransferError::PathEscape(rel.to_string()));
    }
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return Err(TransferError::PathEscape(rel.to_string()));
    }

    // Lexically resolve the relative part; `..` may never pop past the root.
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for comp in rel_path.components() {
        match comp {
            Component::Normal(c) => stack.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(TransferError::PathEscape(rel.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(TransferError::PathEscape(rel.to_string()));
            }
        }
    }

    let root_abs = root
        .canonicalize()
        .map_err(|_| TransferError::PathEscape(format!("root missing: {}", root.display())))?;
    let mut out = root_abs.clone();
    for c in stack {
        out.push(c);
    }
    if !out.starts_with(&root_abs) {
        return Err(TransferError::PathEscape(rel.to_string()));
    }
    Ok(out)
}

/// Reduce an arbitrary peer-supplied name to a single safe path component.
///
/// Directory separators are stripped, everything outside `[A-Za-z0-9._-]`
/// becomes `_`, and `.` / `..` (or an empty result) fall back to `"file"`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let p = safe_join(dir.path(), "a/b/c.txt").unwrap();
        assert!(p.starts_with(dir.path().canonicalize().unwrap()));
        assert!(p.ends_with("a/b/c.txt"));
    }

    #[test]
    fn absolute_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(safe_join(dir.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn colon_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(safe_join(dir.path(), "C:\\x").is_err());
        assert!(safe_join(dir.path(), "a:b").is_err());
    }

    #[test]
    fn parent_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(safe_join(dir.path(), "../outside").is_err());
        assert!(safe_join(dir.path(), "a/../../outside").is_err());
    }

    #[test]
    fn internal_parent_components_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let p = safe_join(dir.path(), "a/../b.txt").unwrap();
        assert!(p.ends_with("b.txt"));
        assert!(!p.to_string_lossy().contains(".."));
    }

    #[test]
    fn curdir_components_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let p = safe_join(dir.path(), "./a/./b").unwrap();
        assert!(p.ends_with("a/b"));
    }

    #[test]
    fn sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("report-v1.2_final.txt"), "report-v1.2_final.txt");
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_filename("a b*c?.txt"), "a_b_c_.txt");
        assert_eq!(sanitize_filename("résumé.pdf"), "r_sum_.pdf");
    }

    #[test]
    fn sanitize_rejects_dot_names() {
        assert_eq!(sanitize_filename("."), "file");
        assert_eq!(sanitize_filename(".."), "file");
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("///"), "file");
    }
}
