//! Boundary-aware chunking.
//!
//! Three strategies, selected by the source document's extension:
//! markdown/plain text (paragraph-based), code (line-based, preferring
//! blank lines, top-level declarations, comments, and closing braces as
//! break points), and generic (sentence-based). All three estimate token
//! count as `chars / 4` and share the same target/min/overlap knobs; none
//! breaks until the accumulated chunk already meets the minimum, so every
//! emitted chunk (other than a document shorter than the minimum) clears
//! it.

use serde::{Deserialize, Serialize};

/// A single chunk of a source document. `start_offset`/`end_offset` bound
/// the chunk's own text (excluding any overlap prepended from the previous
/// chunk) within the source document; code-path chunks record `0, 0`
/// since line-oriented splitting does not track them meaningfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub estimated_tokens: usize,
}

/// Chunking knobs, shared across strategies.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Target chunk size, in estimated tokens.
    pub target_tokens: usize,
    /// Minimum viable chunk size; a break is deferred until the
    /// accumulated chunk already clears this, and a trailing remainder
    /// below it is merged into the previous chunk rather than emitted
    /// standalone.
    pub min_tokens: usize,
    /// Overlap carried from the end of one chunk into the start of the
    /// next, as a fraction of `target_tokens`.
    pub overlap_fraction: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_tokens: 384,
            min_tokens: 100,
            overlap_fraction: 0.15,
        }
    }
}

fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

/// Which chunking strategy to apply, chosen by the caller from the
/// document's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markup,
    Code,
    Generic,
}

impl DocumentKind {
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "md" | "markdown" | "mdx" | "txt" => Self::Markup,
            "py" | "ts" | "js" | "sh" | "rs" | "go" | "java" | "c" | "cpp" | "rb" => Self::Code,
            _ => Self::Generic,
        }
    }
}

/// One splittable unit with its byte span in the original content.
struct Unit<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

/// Chunks `content` using the strategy appropriate for `kind`.
#[must_use]
pub fn chunk(content: &str, kind: DocumentKind, config: ChunkConfig) -> Vec<Chunk> {
    match kind {
        DocumentKind::Markup => assemble_with_overlap(&paragraph_units(content), config, OverlapStyle::LastUnit),
        DocumentKind::Code => assemble_code(content, config),
        DocumentKind::Generic => assemble_with_overlap(&sentence_units(content), config, OverlapStyle::None),
    }
}

fn paragraph_units(content: &str) -> Vec<Unit<'_>> {
    let bytes = content.as_bytes();
    let mut units = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' && bytes.get(i + 1) == Some(&b'\n') {
            push_trimmed(content, start, i, &mut units);
            let mut j = i;
            while j < bytes.len() && bytes[j] == b'\n' {
                j += 1;
            }
            start = j;
            i = j;
            continue;
        }
        i += 1;
    }
    push_trimmed(content, start, bytes.len(), &mut units);
    units
}

fn sentence_units(content: &str) -> Vec<Unit<'_>> {
    let bytes = content.as_bytes();
    let mut units = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let next_is_boundary = bytes.get(i + 1).map(u8::is_ascii_whitespace).unwrap_or(true);
            if next_is_boundary {
                push_trimmed(content, start, i + 1, &mut units);
                start = i + 1;
            }
        }
    }
    push_trimmed(content, start, bytes.len(), &mut units);
    units
}

fn push_trimmed<'a>(content: &'a str, start: usize, end: usize, units: &mut Vec<Unit<'a>>) {
    if start >= end {
        return;
    }
    let slice = &content[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    units.push(Unit {
        text: trimmed,
        start: start + leading,
        end: start + leading + trimmed.len(),
    });
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OverlapStyle {
    /// Seed the next chunk with the last unit (paragraph) of the previous one.
    LastUnit,
    None,
}

/// Greedily packs `units` into chunks near `target_tokens`, deferring a
/// break until the accumulated chunk already clears `min_tokens`, merging
/// an under-sized trailing remainder into its predecessor, and (for
/// [`OverlapStyle::LastUnit`]) prepending the previous chunk's last unit
/// onto the next one.
fn assemble_with_overlap(units: &[Unit<'_>], config: ChunkConfig, overlap: OverlapStyle) -> Vec<Chunk> {
    struct Building<'a> {
        own_units: Vec<&'a Unit<'a>>,
        tokens: usize,
    }

    let mut buildings: Vec<Building> = Vec::new();
    let mut current = Building {
        own_units: Vec::new(),
        tokens: 0,
    };

    for unit in units {
        let unit_tokens = estimate_tokens(unit.text);
        let would_exceed = current.tokens > 0 && current.tokens + unit_tokens > config.target_tokens;
        if would_exceed && current.tokens >= config.min_tokens {
            buildings.push(std::mem::replace(
                &mut current,
                Building {
                    own_units: Vec::new(),
                    tokens: 0,
                },
            ));
        }
        current.own_units.push(unit);
        current.tokens += unit_tokens;
    }
    if !current.own_units.is_empty() {
        buildings.push(current);
    }

    // Merge an undersized trailing chunk into its predecessor.
    if buildings.len() > 1 && buildings.last().unwrap().tokens < config.min_tokens {
        let last = buildings.pop().unwrap();
        let prev = buildings.last_mut().unwrap();
        prev.own_units.extend(last.own_units);
        prev.tokens += last.tokens;
    }

    let mut result = Vec::with_capacity(buildings.len());
    let mut previous_last_unit: Option<&Unit> = None;

    for (index, building) in buildings.iter().enumerate() {
        let own_text = building
            .own_units
            .iter()
            .map(|u| u.text)
            .collect::<Vec<_>>()
            .join("\n\n");

        let content = match (overlap, previous_last_unit) {
            (OverlapStyle::LastUnit, Some(prev)) => format!("{}\n\n{}", prev.text, own_text),
            _ => own_text,
        };

        let start_offset = building.own_units.first().map(|u| u.start).unwrap_or(0);
        let end_offset = building.own_units.last().map(|u| u.end).unwrap_or(0);
        let estimated_tokens = estimate_tokens(&content);

        result.push(Chunk {
            content,
            index,
            start_offset,
            end_offset,
            estimated_tokens,
        });

        previous_last_unit = building.own_units.last().copied();
    }

    result
}

/// Line-by-line greedy fill for code. A break is taken only once the
/// target would be exceeded, the current line is a "good break" point,
/// and the accumulated chunk already clears the minimum; the next chunk
/// is seeded with the last three lines of the previous one as overlap.
/// Offsets are not tracked for code chunks (always `0, 0`).
fn assemble_code(content: &str, config: ChunkConfig) -> Vec<Chunk> {
    const DEFINITION_STARTS: &[&str] = &["def ", "class ", "function ", "const ", "export "];

    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    fn is_good_break(line: &str) -> bool {
        let trimmed = line.trim_start();
        trimmed.is_empty()
            || DEFINITION_STARTS.iter().any(|kw| trimmed.starts_with(kw))
            || trimmed.starts_with('#')
            || trimmed.starts_with("//")
            || trimmed.starts_with('}')
    }

    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0;

    for line in &lines {
        let line_tokens = estimate_tokens(line).max(1);
        let would_exceed = current_tokens > 0 && current_tokens + line_tokens > config.target_tokens;
        if would_exceed && current_tokens >= config.min_tokens && is_good_break(line) {
            groups.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(line);
        current_tokens += line_tokens;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    if groups.len() > 1 {
        let last_tokens: usize = groups.last().unwrap().iter().map(|l| estimate_tokens(l)).sum();
        if last_tokens < config.min_tokens {
            let last = groups.pop().unwrap();
            groups.last_mut().unwrap().extend(last);
        }
    }

    let mut result = Vec::with_capacity(groups.len());
    let mut overlap_lines: Vec<&str> = Vec::new();

    for (index, group) in groups.into_iter().enumerate() {
        let mut body = overlap_lines.clone();
        body.extend(group.iter().copied());
        let text = body.join("\n");

        overlap_lines = group.iter().rev().take(3).rev().copied().collect();

        let estimated_tokens = estimate_tokens(&text);
        result.push(Chunk {
            content: text,
            index,
            start_offset: 0,
            end_offset: 0,
            estimated_tokens,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_is_chars_over_four() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 1);
    }

    #[test]
    fn markdown_splits_on_paragraph_boundaries() {
        let content = "Para one.\n\nPara two.\n\nPara three.";
        let chunks = chunk(content, DocumentKind::Markup, ChunkConfig::default());
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.content.trim().is_empty()));
    }

    #[test]
    fn markdown_chunk_offsets_point_back_into_source() {
        let content = "First paragraph here.\n\nSecond paragraph here.";
        let config = ChunkConfig {
            target_tokens: 4,
            min_tokens: 1,
            overlap_fraction: 0.0,
        };
        let chunks = chunk(content, DocumentKind::Markup, config);
        for c in &chunks {
            assert_eq!(&content[c.start_offset..c.end_offset], content[c.start_offset..c.end_offset].trim());
        }
    }

    #[test]
    fn generic_splits_on_sentence_boundaries() {
        let content = "First sentence. Second sentence! Third sentence?";
        let units = sentence_units(content);
        assert_eq!(units.len(), 3);
    }

    #[test]
    fn every_chunk_meets_the_minimum_when_document_is_long_enough() {
        let config = ChunkConfig {
            target_tokens: 20,
            min_tokens: 10,
            overlap_fraction: 0.0,
        };
        let paragraphs: Vec<String> = (0..10).map(|i| format!("Paragraph number {i} with some body text.")).collect();
        let content = paragraphs.join("\n\n");
        let chunks = chunk(&content, DocumentKind::Markup, config);
        assert!(chunks.len() > 1);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.estimated_tokens >= config.min_tokens);
        }
    }

    #[test]
    fn document_kind_dispatches_by_extension() {
        assert_eq!(DocumentKind::from_extension("md"), DocumentKind::Markup);
        assert_eq!(DocumentKind::from_extension("rs"), DocumentKind::Code);
        assert_eq!(DocumentKind::from_extension("csv"), DocumentKind::Generic);
    }

    #[test]
    fn code_chunking_breaks_at_definition_keywords() {
        let content = "def a():\n    return 1\n\n\ndef b():\n    return 2\n";
        let config = ChunkConfig {
            target_tokens: 4,
            min_tokens: 1,
            overlap_fraction: 0.0,
        };
        let chunks = chunk(content, DocumentKind::Code, config);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().any(|c| c.content.contains("def b()")));
    }

    #[test]
    fn code_chunk_overlap_seeds_last_three_lines() {
        let content = (0..12).map(|i| format!("line_{i} = {i}")).collect::<Vec<_>>().join("\n");
        let config = ChunkConfig {
            target_tokens: 6,
            min_tokens: 1,
            overlap_fraction: 0.0,
        };
        let chunks = chunk(&content, DocumentKind::Code, config);
        assert!(chunks.len() >= 2);
        // Every chunk after the first repeats at least the final line of its predecessor.
        for pair in chunks.windows(2) {
            let prev_last_line = pair[0].content.lines().last().unwrap();
            assert!(pair[1].content.contains(prev_last_line) || pair[1].content.lines().next() == Some(prev_last_line));
        }
    }

    #[test]
    fn code_chunks_record_zero_offsets() {
        let content = "def a():\n    return 1\n";
        let chunks = chunk(content, DocumentKind::Code, ChunkConfig::default());
        assert!(chunks.iter().all(|c| c.start_offset == 0 && c.end_offset == 0));
    }
}
