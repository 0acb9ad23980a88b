//! PDF text extraction via `pdf-extract`.
//!
//! Extracted page-by-page so a `--- Page N ---` marker can precede each
//! page's text per the loader's page-numbered extraction contract; pages
//! that decode to empty text are omitted entirely rather than emitting a
//! bare marker.

use std::path::Path;

use crate::error::LoaderError;

pub fn extract_text(path: &Path) -> Result<String, LoaderError> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| LoaderError::DecodeFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut out = String::new();
    for (index, page) in pages.iter().enumerate() {
        let trimmed = page.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(&format!("--- Page {} ---\n", index + 1));
        out.push_str(trimmed);
        out.push_str("\n\n");
    }

    Ok(out)
}
