//! Vector (k-NN cosine) retrieval.

use std::sync::Arc;

use crate::error::RetrievalError;
use crate::store::{Backend, WhereFilter};

use super::ScoredPassage;

/// Thin wrapper over [`Backend::search_vector`] so the pipeline depends on
/// a narrow retrieval-stage contract rather than the full storage trait.
pub struct VectorRetriever {
    store: Arc<dyn Backend>,
}

impl VectorRetriever {
    #[must_use]
    pub fn new(store: Arc<dyn Backend>) -> Self {
        Self { store }
    }

    /// Returns up to `top_k` hits, ordered best-first, each annotated with
    /// its 1-indexed `vector_rank`.
    pub async fn retrieve(
        &self,
        source_project: &str,
        query_embedding: &[f32],
        top_k: usize,
        filters: &[WhereFilter],
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let results = self
            .store
            .search_vector(source_project, query_embedding, top_k, filters)
            .await?;
        Ok(results
            .into_iter()
            .enumerate()
            .map(|(rank, (passage, score))| {
                let mut scored = ScoredPassage::new(passage, score);
                scored.vector_rank = Some(rank + 1);
                scored
            })
            .collect())
    }
}
