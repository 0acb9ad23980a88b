//! Hybrid retrieval: vector search, BM25 lexical search, reciprocal-rank
//! fusion of the two, optional cross-encoder reranking, and the
//! orchestrating [`pipeline::RetrievalPipeline`].

pub mod bm25;
pub mod fusion;
pub mod pipeline;
pub mod reranker;
pub mod vector;

use serde::{Deserialize, Serialize};

use crate::store::Passage;

/// One retrieved passage, annotated with whichever stage scores have been
/// computed for it so far. `vector_rank`/`bm25_rank`/`rrf_score` are
/// filled in by fusion (§4.11); `rerank_score`/`final_rank` are filled in
/// by the reranker (§4.12) when it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// The stage-native score that produced this entry before fusion:
    /// cosine similarity for a vector-only hit, BM25 score for a
    /// lexical-only hit.
    pub score: f32,
    /// 1-indexed rank in the vector retriever's result list, if present there.
    pub vector_rank: Option<usize>,
    /// 1-indexed rank in the lexical retriever's result list, if present there.
    pub bm25_rank: Option<usize>,
    /// Reciprocal-rank-fusion score, once fusion has run.
    pub rrf_score: Option<f64>,
    /// 1-indexed position after fusion (pre-rerank) ordering.
    pub fusion_rank: Option<usize>,
    /// Cross-encoder score, once the reranker has run.
    pub rerank_score: Option<f32>,
    /// 1-indexed position after reranking.
    pub final_rank: Option<usize>,
}

impl ScoredPassage {
    #[must_use]
    pub fn new(passage: Passage, score: f32) -> Self {
        Self {
            passage,
            score,
            vector_rank: None,
            bm25_rank: None,
            rrf_score: None,
            fusion_rank: None,
            rerank_score: None,
            final_rank: None,
        }
    }
}
