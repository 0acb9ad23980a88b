//! BM25 lexical retrieval.

use std::sync::Arc;

use crate::error::RetrievalError;
use crate::store::{Backend, WhereFilter};

use super::ScoredPassage;

/// Thin wrapper over [`Backend::search_bm25`].
pub struct LexicalRetriever {
    store: Arc<dyn Backend>,
}

impl LexicalRetriever {
    #[must_use]
    pub fn new(store: Arc<dyn Backend>) -> Self {
        Self { store }
    }

    /// Returns up to `top_k` hits, ordered best-first, each annotated with
    /// its 1-indexed `bm25_rank`.
    pub async fn retrieve(
        &self,
        source_project: &str,
        query: &str,
        top_k: usize,
        filters: &[WhereFilter],
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let results = self.store.search_bm25(source_project, query, top_k, filters).await?;
        Ok(results
            .into_iter()
            .enumerate()
            .map(|(rank, (passage, score))| {
                let mut scored = ScoredPassage::new(passage, score);
                scored.bm25_rank = Some(rank + 1);
                scored
            })
            .collect())
    }
}
