//! Fully local retrieval-augmented knowledge base.
//!
//! Documents are loaded, scanned for prompt-injection content, sanitized
//! of PII, chunked, given a situating context, embedded, and stored as
//! content-addressed [`store::Passage`] rows. Retrieval embeds a query,
//! runs vector and BM25 search in parallel, fuses the two result lists
//! with Reciprocal Rank Fusion, optionally reranks with a cross-encoder,
//! and formats the result as a citation-bearing response.
//!
//! [`AppContext`] is the single owned handle an embedder of this crate
//! constructs once and threads through an [`indexer::Indexer`] and a
//! [`retrieval::pipeline::RetrievalPipeline`]; there are no global
//! mutable singletons anywhere in this crate.

pub mod chunking;
pub mod config;
pub mod context;
pub mod daemon;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod loader;
pub mod notify;
pub mod observability;
pub mod provenance;
pub mod retrieval;
pub mod sanitizer;
pub mod security;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use context::ContextLlm;
use embedding::EmbeddingBackend;
use error::RagError;
use indexer::{IndexOptions, Indexer};
use notify::{build_notifier, Notifier};
use observability::Observability;
use retrieval::pipeline::RetrievalPipeline;
use retrieval::reranker::{CrossEncoderBackend, Reranker};
use store::sqlite::SqliteStore;
use store::Backend;

/// Every long-lived handle an application embedding this crate needs,
/// built once from a [`Config`] and a set of daemon backends, then passed
/// explicitly into [`AppContext::indexer`] / [`AppContext::retrieval`]
/// rather than reached for through a global.
pub struct AppContext {
    config: Config,
    store: Arc<dyn Backend>,
    llm: Arc<dyn ContextLlm>,
    embedder: Arc<embedding::Embedder>,
    reranker: Option<Arc<Reranker>>,
    notifier: Arc<dyn Notifier>,
    observability: Observability,
}

impl AppContext {
    /// Opens the configured store and wires every component together.
    /// `llm`/`embedding_backend`/`cross_encoder` are injected so tests and
    /// alternate deployments can supply mocks instead of
    /// [`daemon::DaemonClient`].
    pub async fn build(
        config: Config,
        llm: Arc<dyn ContextLlm>,
        embedding_backend: Arc<dyn EmbeddingBackend>,
        cross_encoder: Option<Arc<dyn CrossEncoderBackend>>,
    ) -> Result<Self, RagError> {
        let store = SqliteStore::open(&config.database.path)
            .await
            .map_err(RagError::Store)?;
        let store: Arc<dyn Backend> = Arc::new(store);

        let notifier = build_notifier(&config.notifications);

        let embedder = Arc::new(embedding::Embedder::new(
            embedding_backend,
            Arc::clone(&notifier),
            32,
        ));

        let reranker = if config.retrieval.enable_reranking {
            cross_encoder.map(|backend| Arc::new(Reranker::new(backend)))
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            llm,
            embedder,
            reranker,
            notifier,
            observability: Observability::disabled(),
        })
    }

    /// Enables the observability hook. A no-op to call more than once;
    /// the last call wins, matching the "resolved once at construction"
    /// contract — callers should do this immediately after [`Self::build`]
    /// and before issuing any `index_document`/`retrieve` calls.
    #[must_use]
    pub fn with_observability(mut self, observability: Observability) -> Self {
        self.observability = observability;
        self
    }

    #[must_use]
    pub fn observability(&self) -> &Observability {
        &self.observability
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds an [`Indexer`] bound to this context's store, LLM, embedder,
    /// and notifier.
    #[must_use]
    pub fn indexer(&self) -> Indexer {
        Indexer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.llm),
            Arc::clone(&self.embedder),
            Arc::clone(&self.notifier),
        )
        .with_observability(self.observability.clone())
    }

    /// Default [`IndexOptions`] for `project`, reading
    /// `security.allowed_base_paths` and the `indexing` section from the
    /// loaded configuration. Falls back to [`default_allowed_base_path`]
    /// when the configuration leaves `allowed_base_paths` empty, since an
    /// empty allow-list would otherwise reject every document (§8 property
    /// 7: nothing descends from zero configured bases).
    #[must_use]
    pub fn index_options(&self, project: &str) -> IndexOptions {
        let allowed_base_paths = if self.config.security.allowed_base_paths.is_empty() {
            vec![default_allowed_base_path()]
        } else {
            self.config.security.allowed_base_paths.clone()
        };

        IndexOptions {
            source_project: project.to_string(),
            allowed_base_paths,
            enable_sanitization: self.config.indexing.enable_sanitization,
            strict_mode: self.config.indexing.strict_mode,
            context_workers: self.config.indexing.context_workers,
        }
    }

    /// Builds a [`RetrievalPipeline`] bound to this context's store,
    /// embedder, reranker (if enabled and available), and notifier.
    #[must_use]
    pub fn retrieval(&self) -> RetrievalPipeline {
        RetrievalPipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            self.reranker.clone(),
            Arc::clone(&self.notifier),
        )
        .with_observability(self.observability.clone())
    }

    /// Convenience accessor for the underlying store, e.g. for a CLI
    /// front-end's `stats` command.
    #[must_use]
    pub fn store(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.store)
    }
}

/// Resolves the default allowed base path (the current working directory)
/// when a caller has not configured `security.allowed_base_paths`
/// explicitly, so path validation has at least one sane default rather
/// than silently permitting everything.
#[must_use]
pub fn default_allowed_base_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;
    use async_trait::async_trait;

    struct EchoLlm;

    #[async_trait]
    impl ContextLlm for EchoLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, RagError> {
            Ok("context".to_string())
        }
    }

    struct FixedEmbeddingBackend;

    #[async_trait]
    impl EmbeddingBackend for FixedEmbeddingBackend {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
            Ok(texts.iter().map(|_| vec![0.1_f32; EMBEDDING_DIM]).collect())
        }
    }

    #[tokio::test]
    async fn builds_an_app_context_against_a_temp_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("vex.sqlite3").display().to_string();
        config.security.allowed_base_paths = vec![std::env::current_dir().unwrap()];

        let context = AppContext::build(config, Arc::new(EchoLlm), Arc::new(FixedEmbeddingBackend), None)
            .await
            .unwrap();

        let indexer = context.indexer();
        let doc = loader::LoadedDocument {
            path: PathBuf::from("docs/a.md"),
            content: "A sufficiently long piece of body content for a single passage.".to_string(),
        };
        let outcome = indexer
            .index_document(&doc, true, &context.index_options("acme"))
            .await
            .unwrap();
        assert!(outcome.passage_count > 0);

        let pipeline = context.retrieval();
        let results = pipeline
            .retrieve(
                "body content",
                &retrieval::pipeline::RetrieveOptions {
                    filters: vec![store::WhereFilter {
                        column: "source_project".to_string(),
                        value: "acme".to_string(),
                    }],
                    enable_reranking: false,
                    ..Default::default()
                },
            )
            .await;
        assert!(!results.is_empty());
    }
}
