//! PPTX text extraction: a `.pptx` is a zip archive of slide XML parts.
//!
//! No corpus example carries a dedicated PPTX crate, so slides are read
//! directly as `ppt/slides/slideN.xml` entries and scanned for `<a:t>`
//! text runs with a streaming XML reader. Each non-empty slide is preceded
//! by a `--- Slide N ---` marker; empty slides are omitted.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use zip::ZipArchive;

use crate::error::LoaderError;

pub fn extract_text(path: &Path) -> Result<String, LoaderError> {
    let file = std::fs::File::open(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut archive = ZipArchive::new(file).map_err(|e| LoaderError::DecodeFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    slide_names.sort_by_key(|n| slide_index(n));

    let mut out = String::new();
    for name in &slide_names {
        let slide_number = slide_index(name);
        let mut entry = archive.by_name(name).map_err(|e| LoaderError::DecodeFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut xml = String::new();
        entry.read_to_string(&mut xml).map_err(|e| LoaderError::DecodeFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let text = extract_slide_text(&xml);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(&format!("--- Slide {} ---\n", slide_number));
        out.push_str(trimmed);
        out.push_str("\n\n");
    }

    Ok(out)
}

/// Slide filenames are `slideN.xml`; extract `N` for stable ordering.
fn slide_index(name: &str) -> usize {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(usize::MAX)
}

fn extract_slide_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text_run = true;
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => {
                in_text_run = false;
                out.push(' ');
            }
            Ok(Event::Text(e)) if in_text_run => {
                if let Ok(text) = e.unescape() {
                    out.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}
