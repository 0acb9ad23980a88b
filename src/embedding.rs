//! Embedding generation against a local embedding daemon.
//!
//! Every vector produced by this crate is fixed at [`EMBEDDING_DIM`]
//! dimensions; the store schema and the vector index are both built
//! around that constant. Batches preserve input order even though the
//! underlying daemon call may reorder or partially fail: a failed or
//! wrong-dimension item becomes `None` at its original position rather
//! than failing the whole batch.

use std::sync::Arc;

use crate::notify::{Notifier, ProgressEvent, Stage};

/// Fixed embedding dimensionality used throughout the crate.
pub const EMBEDDING_DIM: usize = 768;

/// A single embedding vector, always [`EMBEDDING_DIM`] entries long.
pub type Embedding = Vec<f32>;

/// Contract for a local embedding backend, so [`Embedder`] can be tested
/// against a mock instead of a running daemon. One `Err` aborts the whole
/// batch (the daemon is unreachable); a present-but-malformed individual
/// result is instead represented by a short-or-wrong-length vector, which
/// [`Embedder::embed_all`] downgrades to `None` rather than failing the
/// batch.
#[async_trait::async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, String>;
}

/// Batches texts through an [`EmbeddingBackend`], validating dimensionality
/// and emitting progress notifications.
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    notifier: Arc<dyn Notifier>,
    batch_size: usize,
}

impl Embedder {
    #[must_use]
    pub fn new(backend: Arc<dyn EmbeddingBackend>, notifier: Arc<dyn Notifier>, batch_size: usize) -> Self {
        Self {
            backend,
            notifier,
            batch_size: batch_size.max(1),
        }
    }

    /// Embeds a single piece of text (e.g. a retrieval query). Returns
    /// `None` if the daemon call fails or the embedding is the wrong
    /// dimension.
    pub async fn embed_query(&self, text: &str) -> Option<Embedding> {
        let texts = vec![text.to_string()];
        self.embed_all(&texts).await.into_iter().next().flatten()
    }

    /// Embeds `texts` in order, chunked into batches of `batch_size`. The
    /// returned vector has the same length and order as `texts`; an entry
    /// is `None` wherever the backend failed to produce a valid
    /// [`EMBEDDING_DIM`]-length vector for that position. Emits an
    /// `EmbeddingBatch` progress event after every 10 items and on
    /// completion of each underlying batch call.
    pub async fn embed_all(&self, texts: &[String]) -> Vec<Option<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        let total_batches = texts.len().div_ceil(self.batch_size).max(1);
        let total_items = texts.len();
        let mut emitted_since_last_event = 0usize;

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            match self.backend.embed_batch(batch).await {
                Ok(result) if result.len() == batch.len() => {
                    for embedding in result {
                        if embedding.len() == EMBEDDING_DIM {
                            embeddings.push(Some(embedding));
                        } else {
                            tracing::warn!(
                                expected = EMBEDDING_DIM,
                                got = embedding.len(),
                                "dropping embedding with unexpected dimensionality"
                            );
                            embeddings.push(None);
                        }
                    }
                }
                Ok(result) => {
                    tracing::warn!(
                        expected = batch.len(),
                        got = result.len(),
                        "embedding batch returned a mismatched item count; dropping batch"
                    );
                    embeddings.extend(std::iter::repeat_n(None, batch.len()));
                }
                Err(reason) => {
                    tracing::warn!(error = %reason, "embedding batch call failed; dropping batch");
                    embeddings.extend(std::iter::repeat_n(None, batch.len()));
                }
            }

            emitted_since_last_event += batch.len();
            let is_last_batch = batch_index + 1 == total_batches;
            if emitted_since_last_event >= 10 || is_last_batch {
                self.notifier
                    .notify(ProgressEvent::new(
                        Stage::Embedding,
                        "embedding",
                        embeddings.len(),
                        total_items,
                    ))
                    .await;
                emitted_since_last_event = 0;
            }
        }

        embeddings
    }
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for
/// a zero-magnitude vector rather than dividing by zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
