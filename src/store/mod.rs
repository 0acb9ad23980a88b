//! Passage storage: the `Backend` trait and the row type stored for each
//! indexed chunk.
//!
//! Generalizes the teacher's fixed `(id, url, heading, chunk_index,
//! content, metadata, embedding)` chunk shape into the full Passage schema
//! of §3/§6 (exact field names), while keeping the same `#[async_trait]`
//! `Backend` contract and `TransactionalBackend` marker-trait split.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// One indexed, embedded chunk, ready for storage or returned from a query.
/// Field names match §6's persisted schema exactly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Passage {
    /// Freshly generated opaque id, assigned once at construction.
    pub chunk_id: String,
    pub chunk_index: usize,
    /// Original chunk text, before any context was prepended.
    pub original_chunk: String,
    /// The text actually embedded: an LLM-generated situating sentence, or
    /// the fixed fallback sentence when generation was skipped or failed,
    /// followed by `"\n\n"` and `original_chunk`.
    pub contextual_chunk: String,
    /// The LLM-generated situating sentence, when one was actually
    /// produced. `None` when generation was skipped by the selective
    /// heuristic or the LLM call failed, in which case `contextual_chunk`
    /// was built from the fixed fallback sentence instead.
    pub generated_context: Option<String>,
    /// Always `Some` with length 768 once persisted; only transiently
    /// `None` between chunking and embedding.
    pub embedding: Option<Vec<f32>>,
    pub source_file: String,
    pub source_project: String,
    pub file_path: String,
    pub file_type: String,
    /// SHA-256 of the entire source document's sanitized text; shared by
    /// every passage of the same document.
    pub content_hash: String,
    /// ISO-8601 timestamp of first indexing.
    pub indexed_at: String,
    /// ISO-8601 timestamp of the most recent (re-)index that produced
    /// this row.
    pub last_updated: String,
    pub token_count: usize,
    pub trust_level: String,
    pub trust_score: f32,
    pub security_risk: String,
}

impl Passage {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_project: impl Into<String>,
        file_path: impl Into<String>,
        chunk_index: usize,
        original_chunk: impl Into<String>,
        content_hash: impl Into<String>,
        now: impl Into<String>,
    ) -> Self {
        let source_project = source_project.into();
        let file_path = file_path.into();
        let original_chunk = original_chunk.into();
        let chunk_id = Uuid::new_v4().to_string();
        let source_file = file_path
            .rsplit('/')
            .next()
            .unwrap_or(&file_path)
            .to_string();
        let file_type = file_path
            .rsplit('.')
            .next()
            .filter(|ext| *ext != file_path)
            .unwrap_or_default()
            .to_string();
        let now = now.into();
        let token_count = (original_chunk.chars().count() / 4).max(1);

        Self {
            chunk_id,
            chunk_index,
            contextual_chunk: original_chunk.clone(),
            original_chunk,
            generated_context: None,
            embedding: None,
            source_file,
            source_project,
            file_path,
            file_type,
            content_hash: content_hash.into(),
            indexed_at: now.clone(),
            last_updated: now,
            token_count,
            trust_level: "VERIFIED".to_string(),
            trust_score: 0.75,
            security_risk: "CLEAN".to_string(),
        }
    }

    #[must_use]
    pub fn with_contextual_text(
        mut self,
        generated_context: Option<String>,
        contextual_chunk: impl Into<String>,
    ) -> Self {
        self.generated_context = generated_context;
        self.contextual_chunk = contextual_chunk.into();
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_trust(mut self, trust_level: impl Into<String>, trust_score: f32) -> Self {
        self.trust_level = trust_level.into();
        self.trust_score = trust_score;
        self
    }

    #[must_use]
    pub fn with_security_risk(mut self, security_risk: impl Into<String>) -> Self {
        self.security_risk = security_risk.into();
        self
    }
}

/// A filter applied to a retrieval-time query. Value is always treated as
/// a string; safe-SQL escaping (quote doubling) is applied uniformly to
/// every filter, in both the vector and lexical search code paths — no
/// "internal" call site is exempt.
#[derive(Clone, Debug)]
pub struct WhereFilter {
    pub column: String,
    pub value: String,
}

/// Escapes a value for safe interpolation into a SQL string literal by
/// doubling single quotes. Applied to every `WhereFilter` before it
/// reaches a query, in both `search_vector` and `search_bm25`.
#[must_use]
pub fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Unified trait for passage storage backends.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Inserts or replaces passages by id (content-addressed upsert).
    async fn upsert_passages(&self, passages: Vec<Passage>) -> Result<(), StoreError>;

    /// Fetches a single passage by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<Passage>, StoreError>;

    /// Returns the stored `content_hash` shared by every passage of
    /// `file_path` within `source_project`, if any passages exist for it.
    async fn get_content_hash(
        &self,
        source_project: &str,
        file_path: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Counts passages belonging to `file_path` within `source_project`.
    async fn count_by_file(&self, source_project: &str, file_path: &str) -> Result<usize, StoreError>;

    /// Deletes every passage belonging to `file_path` within
    /// `source_project`. Returns the actual number of rows deleted.
    async fn delete_by_file(&self, source_project: &str, file_path: &str) -> Result<usize, StoreError>;

    /// Deletes every passage belonging to `source_project`. Returns the
    /// actual number of rows deleted.
    async fn delete_by_project(&self, source_project: &str) -> Result<usize, StoreError>;

    /// k-NN vector search by cosine distance, optionally restricted to
    /// `source_project` (an empty string searches every project) and any
    /// additional `filters`.
    async fn search_vector(
        &self,
        source_project: &str,
        query_embedding: &[f32],
        top_k: usize,
        filters: &[WhereFilter],
    ) -> Result<Vec<(Passage, f32)>, StoreError>;

    /// BM25 lexical search over passage content, optionally restricted to
    /// `source_project` (an empty string searches every project) and any
    /// additional `filters`. Creates the FTS index lazily on first call if
    /// it is missing.
    async fn search_bm25(
        &self,
        source_project: &str,
        query: &str,
        top_k: usize,
        filters: &[WhereFilter],
    ) -> Result<Vec<(Passage, f32)>, StoreError>;

    /// Total number of passages in the store (across all projects).
    async fn count(&self) -> Result<usize, StoreError>;

    /// Summary stats, keyed by a descriptive label. Always succeeds with
    /// either a populated map or a single `"error"` key describing the
    /// failure, matching the reference `get_stats` contract.
    async fn get_stats(&self) -> std::collections::BTreeMap<String, serde_json::Value>;
}

/// Marker trait for backends that support transactional multi-statement
/// operations. No operation in this crate currently requires it (delete-
/// then-insert is intentionally two separate calls, see `DESIGN.md`), but
/// the split is kept so a future backend can opt in without widening
/// `Backend` itself.
pub trait TransactionalBackend: Backend {}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> String {
        "2026-01-01T00:00:00Z".to_string()
    }

    #[test]
    fn passage_id_is_freshly_generated_each_call() {
        let a = Passage::new("proj", "docs/a.md", 0, "content", "hash", now());
        let b = Passage::new("proj", "docs/a.md", 0, "content", "hash", now());
        assert_ne!(a.chunk_id, b.chunk_id);
        assert!(uuid::Uuid::parse_str(&a.chunk_id).is_ok());
    }

    #[test]
    fn derives_source_file_and_file_type_from_path() {
        let p = Passage::new("proj", "docs/nested/a.md", 0, "content", "hash", now());
        assert_eq!(p.source_file, "a.md");
        assert_eq!(p.file_type, "md");
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(escape_sql_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_sql_literal("plain"), "plain");
    }
}
