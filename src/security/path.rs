//! Path traversal prevention.
//!
//! Every path accepted from a document source or a CLI argument is expanded
//! (`~`), canonicalized (resolving symlinks and `..` segments), and checked
//! against a configured allow-list of base directories before it is used.

use std::path::{Path, PathBuf};

use crate::error::SecurityError;

/// Resolves `path` to its canonical form and verifies it falls under one of
/// `allowed_bases`. Returns the canonical path on success.
pub fn validate_path(path: &Path, allowed_bases: &[PathBuf]) -> Result<PathBuf, SecurityError> {
    let expanded = expand_tilde(path);

    let canonical = expanded.canonicalize().unwrap_or_else(|_| to_absolute_lexical(&expanded));

    let canonical_bases: Vec<PathBuf> = allowed_bases
        .iter()
        .map(|b| {
            let expanded_base = expand_tilde(b);
            expanded_base
                .canonicalize()
                .unwrap_or_else(|_| to_absolute_lexical(&expanded_base))
        })
        .collect();

    if canonical_bases.iter().any(|base| canonical.starts_with(base)) {
        Ok(canonical)
    } else {
        Err(SecurityError::PathTraversal {
            path: canonical.display().to_string(),
            bases: canonical_bases
                .iter()
                .map(|b| b.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Expands a leading `~` or `~/` to the current user's home directory.
/// Paths without a leading `~` are returned unchanged.
fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        return dirs_home();
    }
    if let Some(rest) = s.strip_prefix("~/") {
        return dirs_home().join(rest);
    }
    path.to_path_buf()
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/"))
}

/// Resolves `..`/`.` segments lexically when the path does not exist on disk
/// yet (so `canonicalize` would fail even for an otherwise-legitimate path,
/// e.g. a not-yet-created output file), first anchoring a relative path to
/// the current working directory so the result is always absolute, matching
/// `canonicalize`'s contract on the success path.
fn to_absolute_lexical(path: &Path) -> PathBuf {
    let anchored = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in anchored.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_path_under_allowed_base() {
        let tmp = std::env::temp_dir();
        let nested = tmp.join("vexrag-path-test");
        std::fs::create_dir_all(&nested).unwrap();
        let file = nested.join("doc.md");
        std::fs::write(&file, "hi").unwrap();

        let result = validate_path(&file, &[tmp.clone()]);
        assert!(result.is_ok());

        std::fs::remove_dir_all(&nested).ok();
    }

    #[test]
    fn rejects_path_outside_allowed_bases() {
        let tmp = std::env::temp_dir();
        let other = PathBuf::from("/etc/passwd");
        let result = validate_path(&other, &[tmp.join("only-this-subdir")]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_allow_list_rejects_everything() {
        // Property 7 (§8): a path is valid iff it descends from *some*
        // configured base. With no base configured, nothing qualifies.
        let result = validate_path(Path::new("/tmp"), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn lexical_normalization_resolves_dotdot() {
        let normalized = to_absolute_lexical(Path::new("/a/b/../c"));
        assert_eq!(normalized, PathBuf::from("/a/c"));
    }

    #[test]
    fn lexical_normalization_anchors_relative_paths_to_cwd() {
        let normalized = to_absolute_lexical(Path::new("docs/guide.md"));
        assert_eq!(normalized, std::env::current_dir().unwrap().join("docs/guide.md"));
    }
}
