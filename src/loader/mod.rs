//! Document loading: turns a file on disk into plain text ready for
//! chunking, dispatching by extension to a format-specific decoder.
//!
//! [`load_document`] handles a single file; [`load_directory`] walks a
//! directory recursively, skipping a default set of noise directories and
//! isolating per-file failures so one bad document does not abort a batch.

mod docx;
mod pdf;
mod pptx;

use std::path::{Path, PathBuf};

use crate::error::LoaderError;

/// Directory names excluded by default when walking a source tree.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules",
    ".git",
    ".venv",
    ".venv-rag",
    "__pycache__",
    "dist",
    "build",
    "output",
    "temp",
    ".DS_Store",
];

/// A single loaded document, ready for sanitization and chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub content: String,
}

/// Loads and decodes one file by its extension. Plain text and markup
/// formats (`.md`, `.txt`, and unrecognized-but-textual extensions) are
/// read as UTF-8; `.pdf`, `.docx`, and `.pptx` dispatch to dedicated
/// decoders.
pub fn load_document(path: &Path) -> Result<LoadedDocument, LoaderError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let content = match extension.as_str() {
        "pdf" => pdf::extract_text(path)?,
        "docx" => docx::extract_text(path)?,
        "pptx" => pptx::extract_text(path)?,
        "md" | "markdown" | "txt" | "rst" | "py" | "rs" | "ts" | "js" | "yml" | "yaml" | "json"
        | "toml" | "" => read_text_file(path)?,
        other => {
            return Err(LoaderError::UnsupportedFormat {
                extension: other.to_string(),
            })
        }
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LoaderError::EmptyDocument {
            path: path.display().to_string(),
        });
    }

    Ok(LoadedDocument {
        path: path.to_path_buf(),
        content,
    })
}

fn read_text_file(path: &Path) -> Result<String, LoaderError> {
    std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Recursively walks `root`, loading every file whose extension is
/// recognized and whose path does not contain a default-excluded
/// directory segment. Per-file errors are collected rather than aborting
/// the walk, so a single corrupt PDF does not lose the rest of the batch.
pub fn load_directory(root: &Path) -> (Vec<LoadedDocument>, Vec<(PathBuf, LoaderError)>) {
    let mut documents = Vec::new();
    let mut failures = Vec::new();
    walk(root, &mut documents, &mut failures);
    (documents, failures)
}

fn walk(dir: &Path, documents: &mut Vec<LoadedDocument>, failures: &mut Vec<(PathBuf, LoaderError)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if DEFAULT_EXCLUDES.iter().any(|excl| name.as_ref() == *excl) {
            continue;
        }

        if path.is_dir() {
            walk(&path, documents, failures);
            continue;
        }

        match load_document(&path) {
            Ok(doc) => documents.push(doc),
            Err(LoaderError::UnsupportedFormat { .. }) => {
                // Silently skip files we don't know how to decode; only
                // genuine decode/IO failures on recognized formats count
                // as batch failures.
            }
            Err(e) => failures.push((path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.md");
        std::fs::write(&file, "# Heading\n\nBody text.").unwrap();

        let doc = load_document(&file).unwrap();
        assert!(doc.content.contains("Heading"));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.txt");
        std::fs::write(&file, "   \n\t").unwrap();

        let result = load_document(&file);
        assert!(matches!(result, Err(LoaderError::EmptyDocument { .. })));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("image.png");
        std::fs::write(&file, [0u8, 1, 2, 3]).unwrap();

        let result = load_document(&file);
        assert!(matches!(result, Err(LoaderError::UnsupportedFormat { .. })));
    }

    #[test]
    fn directory_walk_skips_excluded_dirs_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/should_skip.md"), "skip me").unwrap();
        std::fs::write(dir.path().join("good.md"), "keep me").unwrap();
        std::fs::write(dir.path().join("blank.txt"), "   ").unwrap();

        let (documents, failures) = load_directory(dir.path());
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, "keep me");
        assert_eq!(failures.len(), 1);
    }
}
