//! HTTP client against a locally-hosted inference daemon.
//!
//! One small `reqwest::Client`-backed struct implements all three
//! pluggable backends the rest of the crate is written against
//! ([`crate::context::ContextLlm`], [`crate::embedding::EmbeddingBackend`],
//! [`crate::retrieval::reranker::CrossEncoderBackend`]), since all three
//! are just different endpoints on the same locally-running process.
//! Every call is best-effort from the caller's point of view: a daemon
//! that is down or slow degrades the relevant pipeline stage rather than
//! failing ingestion or retrieval outright.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ContextLlm;
use crate::embedding::EmbeddingBackend;
use crate::error::RagError;
use crate::retrieval::reranker::CrossEncoderBackend;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for the local inference daemon's completion, embedding, and
/// rerank endpoints.
pub struct DaemonClient {
    client: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new(
            std::env::var("VEXRAG_DAEMON_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        )
    }
}

/// Temperature used for situating-context completions: low, favoring a
/// terse and consistent sentence over creative phrasing.
const CONTEXT_TEMPERATURE: f32 = 0.3;
/// Upper bound on predicted tokens for a situating-context completion.
const CONTEXT_MAX_TOKENS: u32 = 100;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    completion: String,
}

#[async_trait::async_trait]
impl ContextLlm for DaemonClient {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let response = self
            .client
            .post(self.endpoint("/v1/complete"))
            .json(&CompletionRequest {
                prompt,
                temperature: CONTEXT_TEMPERATURE,
                max_tokens: CONTEXT_MAX_TOKENS,
            })
            .send()
            .await
            .map_err(|e| pipeline_failure("context", e))?
            .error_for_status()
            .map_err(|e| pipeline_failure("context", e))?
            .json::<CompletionResponse>()
            .await
            .map_err(|e| pipeline_failure("context", e))?;
        Ok(response.completion)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait::async_trait]
impl EmbeddingBackend for DaemonClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let response = self
            .client
            .post(self.endpoint("/v1/embed"))
            .json(&EmbedRequest { texts })
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json::<EmbedResponse>()
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.embeddings)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    passages: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

#[async_trait::async_trait]
impl CrossEncoderBackend for DaemonClient {
    async fn probe(&self) -> Result<(), RagError> {
        self.client
            .get(self.endpoint("/v1/health"))
            .send()
            .await
            .map_err(|e| pipeline_failure("reranker", e))?
            .error_for_status()
            .map_err(|e| pipeline_failure("reranker", e))?;
        Ok(())
    }

    async fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RagError> {
        let response = self
            .client
            .post(self.endpoint("/v1/rerank"))
            .json(&RerankRequest { query, passages })
            .send()
            .await
            .map_err(|e| pipeline_failure("reranker", e))?
            .error_for_status()
            .map_err(|e| pipeline_failure("reranker", e))?
            .json::<RerankResponse>()
            .await
            .map_err(|e| pipeline_failure("reranker", e))?;
        Ok(response.scores)
    }
}

fn pipeline_failure(stage: &str, error: reqwest::Error) -> RagError {
    RagError::PipelineFailure {
        stage: stage.to_string(),
        reason: error.to_string(),
    }
}
