//! Retrieval Pipeline orchestration (§4.10): embed → vector search →
//! optional BM25 search → Reciprocal Rank Fusion → optional reranking →
//! citation-formatted response.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::embedding::Embedder;
use crate::notify::{Notifier, ProgressEvent, Stage};
use crate::observability::Observability;
use crate::store::{Backend, WhereFilter};

use super::bm25::LexicalRetriever;
use super::fusion::{get_fusion_stats, reciprocal_rank_fusion, FusionStats};
use super::reranker::Reranker;
use super::vector::VectorRetriever;
use super::ScoredPassage;

/// Tunable knobs for one [`RetrievalPipeline::retrieve`] call, defaulting
/// to the values named in §4.10.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub vector_limit: usize,
    pub bm25_limit: usize,
    pub fusion_limit: usize,
    pub enable_bm25: bool,
    pub enable_reranking: bool,
    pub filters: Vec<WhereFilter>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            vector_limit: 20,
            bm25_limit: 20,
            fusion_limit: 10,
            enable_bm25: true,
            enable_reranking: true,
            filters: Vec::new(),
        }
    }
}

/// One entry of the "documents with citations" response envelope (§6).
#[derive(Debug, Clone, Serialize)]
pub struct CitedDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: CitedSource,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub citations: CitationFlag,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitedSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationFlag {
    pub enabled: bool,
}

impl From<&ScoredPassage> for CitedDocument {
    fn from(scored: &ScoredPassage) -> Self {
        let passage = &scored.passage;
        Self {
            kind: "document".to_string(),
            source: CitedSource {
                kind: "text".to_string(),
                media_type: "text/plain".to_string(),
                data: passage.original_chunk.clone(),
            },
            title: format!("{} ({})", passage.source_file, passage.source_project),
            context: passage.generated_context.clone(),
            citations: CitationFlag { enabled: true },
        }
    }
}

/// Orchestrates hybrid retrieval against one [`Backend`] store.
pub struct RetrievalPipeline {
    store: Arc<dyn Backend>,
    embedder: Arc<Embedder>,
    reranker: Option<Arc<Reranker>>,
    notifier: Arc<dyn Notifier>,
    observability: Observability,
}

impl RetrievalPipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn Backend>,
        embedder: Arc<Embedder>,
        reranker: Option<Arc<Reranker>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            notifier,
            observability: Observability::disabled(),
        }
    }

    /// Attaches an observability hook, so every [`Self::retrieve`] call
    /// emits a latency-trace record per §6. A no-op to call more than
    /// once; the last call wins.
    #[must_use]
    pub fn with_observability(mut self, observability: Observability) -> Self {
        self.observability = observability;
        self
    }

    /// Runs the full §4.10 pipeline and returns the fused/reranked list.
    /// Callers wanting the citation envelope should pass the result
    /// through [`CitedDocument::from`].
    pub async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Vec<ScoredPassage> {
        let trace = self.observability.start_trace("retrieve", "retrieve");

        let Some(query_embedding) = self.embedder.embed_query(query).await else {
            trace
                .finish(
                    &self.observability,
                    serde_json::json!({"query": query, "top_k": options.top_k, "result_count": 0}),
                )
                .await;
            return Vec::new();
        };

        let vector_retriever = VectorRetriever::new(Arc::clone(&self.store));
        let source_project = options
            .filters
            .iter()
            .find(|f| f.column == "source_project")
            .map(|f| f.value.clone())
            .unwrap_or_default();

        let vector_results = vector_retriever
            .retrieve(&source_project, &query_embedding, options.vector_limit, &options.filters)
            .await
            .unwrap_or_default();

        let bm25_results = if options.enable_bm25 {
            let lexical_retriever = LexicalRetriever::new(Arc::clone(&self.store));
            lexical_retriever
                .retrieve(&source_project, query, options.bm25_limit, &options.filters)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let fused = if !vector_results.is_empty() && !bm25_results.is_empty() {
            reciprocal_rank_fusion(&vector_results, &bm25_results, options.fusion_limit)
        } else if !vector_results.is_empty() {
            let mut v = vector_results;
            v.truncate(options.fusion_limit);
            v
        } else {
            let mut b = bm25_results;
            b.truncate(options.fusion_limit);
            b
        };

        let results = if options.enable_reranking {
            match &self.reranker {
                Some(reranker) => reranker.rerank(query, fused, options.top_k).await,
                None => take_top_k(fused, options.top_k),
            }
        } else {
            take_top_k(fused, options.top_k)
        };

        self.notifier
            .notify(ProgressEvent::new(
                Stage::Complete,
                format!("retrieved {} results for \"{query}\"", results.len()),
                results.len(),
                results.len(),
            ))
            .await;

        trace
            .finish(
                &self.observability,
                serde_json::json!({"query": query, "top_k": options.top_k, "result_count": results.len()}),
            )
            .await;

        results
    }

    /// Convenience wrapper restricting retrieval to a single project by
    /// pre-populating `filters = {source_project: project}`.
    pub async fn retrieve_in_project(&self, query: &str, project: &str, mut options: RetrieveOptions) -> Vec<ScoredPassage> {
        options.filters.retain(|f| f.column != "source_project");
        options.filters.push(WhereFilter {
            column: "source_project".to_string(),
            value: project.to_string(),
        });
        self.retrieve(query, &options).await
    }

    /// Diagnostic fusion stats (vector-only/bm25-only/both counts) over an
    /// already-fused list, exposed for callers that want to log or report
    /// hybrid-retrieval coverage.
    #[must_use]
    pub fn fusion_stats(fused: &[ScoredPassage]) -> FusionStats {
        get_fusion_stats(fused)
    }

    /// Formats a result list as the "documents with citations" response
    /// envelope (§6), serialized to a JSON array.
    #[must_use]
    pub fn format_as_citations(results: &[ScoredPassage]) -> serde_json::Value {
        let documents: Vec<CitedDocument> = results.iter().map(CitedDocument::from).collect();
        json!(documents)
    }
}

fn take_top_k(mut results: Vec<ScoredPassage>, top_k: usize) -> Vec<ScoredPassage> {
    results.truncate(top_k);
    results
}
