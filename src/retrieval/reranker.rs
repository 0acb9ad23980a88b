//! Cross-encoder reranking (§4.12).
//!
//! The cross-encoder model is loaded lazily: construction never touches
//! the network, and the first `rerank` call probes availability once,
//! caching the result for every subsequent call via a [`tokio::sync::OnceCell`].
//! A probe failure or a scoring-time failure both degrade the same way —
//! the input list is truncated to `top_k` unchanged.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::RagError;

use super::ScoredPassage;

/// Contract for a cross-encoder backend scoring `(query, passage)` pairs.
#[async_trait::async_trait]
pub trait CrossEncoderBackend: Send + Sync {
    /// Confirms the model/daemon endpoint is reachable. Called once, the
    /// first time a [`Reranker`] is used.
    async fn probe(&self) -> Result<(), RagError>;

    /// Scores `query` against every entry of `passages`, in order.
    async fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RagError>;
}

/// Lazily-loaded cross-encoder reranker.
pub struct Reranker {
    backend: Arc<dyn CrossEncoderBackend>,
    available: OnceCell<bool>,
}

impl Reranker {
    #[must_use]
    pub fn new(backend: Arc<dyn CrossEncoderBackend>) -> Self {
        Self {
            backend,
            available: OnceCell::new(),
        }
    }

    /// Triggers the lazy probe eagerly. The Retrieval Pipeline may call
    /// this at its own construction time as a cold-start optimization
    /// without changing `rerank`'s own lazy-by-default contract.
    pub async fn ensure_loaded(&self) -> bool {
        *self
            .available
            .get_or_init(|| async { self.backend.probe().await.is_ok() })
            .await
    }

    /// Scores every candidate against `query`, sorts descending, and
    /// truncates to `top_k`. On model-load or scoring failure, returns the
    /// first `top_k` of `candidates` unchanged.
    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredPassage>, top_k: usize) -> Vec<ScoredPassage> {
        if candidates.is_empty() {
            return candidates;
        }

        if !self.ensure_loaded().await {
            return take_unchanged(candidates, top_k);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.passage.contextual_chunk.clone()).collect();
        match self.backend.score_pairs(query, &texts).await {
            Ok(scores) if scores.len() == candidates.len() => {
                let mut scored: Vec<ScoredPassage> = candidates
                    .into_iter()
                    .zip(scores)
                    .map(|(mut c, score)| {
                        c.rerank_score = Some(score);
                        c
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.rerank_score
                        .partial_cmp(&a.rerank_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                scored.truncate(top_k);
                for (rank, c) in scored.iter_mut().enumerate() {
                    c.final_rank = Some(rank + 1);
                }
                scored
            }
            _ => take_unchanged(candidates, top_k),
        }
    }
}

fn take_unchanged(mut candidates: Vec<ScoredPassage>, top_k: usize) -> Vec<ScoredPassage> {
    candidates.truncate(top_k);
    candidates
}
