//! Contextual-retrieval style context generation.
//!
//! For each chunk, asks a local LLM daemon for a short sentence situating
//! the chunk within its parent document, which is prepended before
//! embedding (improves retrieval recall on chunks that read ambiguously
//! in isolation). Generation is selective: chunks that are already
//! self-describing (headings, short code snippets, list items, table
//! rows) skip the LLM call entirely and keep their bare original text.
//! When a call is attempted but fails or returns a too-short result, a
//! fixed fallback sentence naming the source file and project is
//! prepended instead of leaving the chunk bare. Calls run with bounded
//! concurrency via a semaphore.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::chunking::Chunk;
use crate::error::RagError;

const PROMPT_TEMPLATE: &str = "\
<document>
{document}
</document>

Here is the chunk we want to situate within the whole document:
<chunk>
{chunk}
</chunk>

Please give a short succinct context to situate this chunk within the \
overall document for the purposes of improving search retrieval of the \
chunk. Answer only with the succinct context and nothing else.";

/// A chunk paired with its generated (or fallback) situating context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualChunk {
    pub chunk_index: usize,
    pub content: String,
    /// `Some` only when the LLM actually produced an accepted context;
    /// `None` when generation was skipped, failed, or the result was too
    /// short. This distinction is what the store persists as
    /// `generated_context`.
    pub context: Option<String>,
    /// Full text used for embedding and lexical indexing: the bare
    /// `content` when the chunk was selectively skipped, or the
    /// generated/fallback sentence followed by `content` otherwise.
    pub contextual_text: String,
}

impl ContextualChunk {
    /// Text actually sent to the embedder: `contextual_text`, which already
    /// folds in the chunk body (either bare, for a selectively skipped
    /// chunk, or prefixed with the generated/fallback context sentence).
    #[must_use]
    pub fn embeddable_text(&self) -> String {
        self.contextual_text.clone()
    }
}

/// Minimum length (in characters) of an LLM-generated context for it to be
/// accepted; shorter outputs are treated the same as a failed call.
const MIN_GENERATED_CONTEXT_CHARS: usize = 10;

/// Fixed fallback sentence used when context generation is skipped or
/// fails, per §4.6: `"This is from <path> in the <project> project."`.
#[must_use]
pub fn fallback_context(file_path: &str, source_project: &str) -> String {
    format!("This is from {file_path} in the {source_project} project.")
}

/// A minimal local-LLM client contract, so the context generator can be
/// tested against a mock without a real daemon running.
#[async_trait::async_trait]
pub trait ContextLlm: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;
}

/// Heuristics that skip an LLM call entirely for chunks unlikely to
/// benefit from added context: empty content, very short chunks, lone
/// markdown headings, fenced code blocks, single list items, and
/// markdown table rows.
fn should_generate_context(chunk: &Chunk) -> bool {
    let trimmed = chunk.content.trim();

    if trimmed.chars().count() < 100 {
        return false;
    }
    if trimmed.starts_with('#') {
        return false;
    }
    let first_50: String = trimmed.chars().take(50).collect();
    if trimmed.starts_with("```") || first_50.contains("```") {
        return false;
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() <= 2 && lines.iter().all(|l| is_list_item(l.trim_start())) {
        return false;
    }
    if is_table_row(trimmed) {
        return false;
    }

    true
}

fn is_list_item(line: &str) -> bool {
    if line.starts_with("- ") || line.starts_with("* ") {
        return true;
    }
    match line.find(". ") {
        Some(idx) => line[..idx].chars().all(|c| c.is_ascii_digit()) && idx > 0,
        None => false,
    }
}

fn is_table_row(line: &str) -> bool {
    line.starts_with('|') && line.matches('|').count() > 2
}

fn format_prompt(document: &str, chunk: &str) -> String {
    PROMPT_TEMPLATE.replace("{document}", document).replace("{chunk}", chunk)
}

/// Generates contexts for every chunk of one document, running up to
/// `max_concurrency` LLM calls at once. Chunks skipped by the selective
/// heuristic, and chunks whose LLM call fails, get the fixed fallback
/// sentence for `file_path`/`source_project` instead of an LLM-written
/// one, without consuming a concurrency slot in the skipped case.
pub async fn generate_contexts_parallel(
    llm: Arc<dyn ContextLlm>,
    document_text: &str,
    chunks: &[Chunk],
    max_concurrency: usize,
    file_path: &str,
    source_project: &str,
) -> Vec<ContextualChunk> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let document_text = Arc::new(document_text.to_string());
    let fallback = fallback_context(file_path, source_project);

    let mut handles = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if !should_generate_context(chunk) {
            handles.push(tokio::spawn(std::future::ready(ContextualChunk {
                chunk_index: chunk.index,
                content: chunk.content.clone(),
                context: None,
                contextual_text: chunk.content.clone(),
            })));
            continue;
        }

        let llm = Arc::clone(&llm);
        let semaphore = Arc::clone(&semaphore);
        let document_text = Arc::clone(&document_text);
        let chunk_index = chunk.index;
        let chunk_content = chunk.content.clone();
        let fallback = fallback.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let prompt = format_prompt(&document_text, &chunk_content);
            match llm.complete(&prompt).await {
                Ok(generated) if generated.trim().chars().count() >= MIN_GENERATED_CONTEXT_CHARS => {
                    let contextual_text = format!("{generated}\n\n{chunk_content}");
                    ContextualChunk {
                        chunk_index,
                        content: chunk_content,
                        context: Some(generated),
                        contextual_text,
                    }
                }
                _ => {
                    let contextual_text = format!("{fallback}\n\n{chunk_content}");
                    ContextualChunk {
                        chunk_index,
                        content: chunk_content,
                        context: None,
                        contextual_text,
                    }
                }
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(contextual_chunk) = handle.await {
            results.push(contextual_chunk);
        }
    }
    results.sort_by_key(|c| c.chunk_index);
    results
}
