//! Embedding provider abstraction and the Ollama implementation.
//!
//! The pipeline embeds chunk text and query text through the
//! [`EmbeddingProvider`] trait so tests can substitute a deterministic
//! provider. Image content never reaches this layer directly: it is
//! bridged into the text vector space via captions (see
//! [`crate::vision`]), which keeps all vectors in one space and makes
//! the shared-space fusion policy sound.
//!
//! # Retry Strategy
//!
//! Transient failures are retried with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Exhausted retries surface as
//! [`PipelineError::EmbeddingUnavailable`], failing the enclosing
//! ingestion or query operation.

use async_trait::async_trait;
use std::time::Duration;

use folio_core::error::PipelineError;

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"qwen3-embedding:4b"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality, or 0 if accepted as-returned.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, preserving input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, PipelineError> {
    let results = provider.embed_texts(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::EmbeddingUnavailable("empty embedding response".to_string()))
}

/// Embedding provider backed by a locally hosted Ollama server.
///
/// Calls `POST /api/embed` with batched input.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::EmbeddingUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| PipelineError::EmbeddingUnavailable(e.to_string()))?;
                        let vectors = parse_embed_response(&json)?;
                        return self.check_dims(vectors, texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = PipelineError::EmbeddingUnavailable(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    ));

                    // Rate limited or server error: retry. Other client
                    // errors will not improve on retry.
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(PipelineError::EmbeddingUnavailable(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::EmbeddingUnavailable("embedding failed after retries".to_string())
        }))
    }
}

impl OllamaProvider {
    fn check_dims(
        &self,
        vectors: Vec<Vec<f32>>,
        expected_count: usize,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        if vectors.len() != expected_count {
            return Err(PipelineError::EmbeddingUnavailable(format!(
                "expected {} vectors, got {}",
                expected_count,
                vectors.len()
            )));
        }
        if self.dims > 0 {
            if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
                return Err(PipelineError::EmbeddingUnavailable(format!(
                    "expected {}-dimensional vectors, got {}",
                    self.dims,
                    bad.len()
                )));
            }
        }
        Ok(vectors)
    }
}

/// Parse the Ollama `/api/embed` response.
fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let data = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            PipelineError::EmbeddingUnavailable(
                "invalid embed response: missing embeddings array".to_string(),
            )
        })?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let values = item.as_array().ok_or_else(|| {
            PipelineError::EmbeddingUnavailable("invalid embed response: non-array vector".to_string())
        })?;
        vectors.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(vectors)
}
