//! Image-to-text bridging via a multimodal model.
//!
//! Two jobs, one capability: at ingest time every extracted image is
//! captioned so it can live in the text embedding space; at query time
//! an uploaded query image is described so the description can be
//! embedded as the image-side query vector. Both go through the
//! [`Captioner`] trait so tests can substitute a deterministic
//! describer.

use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

use folio_core::error::PipelineError;

use crate::config::VisionConfig;

/// Prompt used to caption images extracted from documents.
pub const CHUNK_CAPTION_PROMPT: &str = "Provide a detailed description of this image. If it \
contains charts, graphs, or tables, extract the key information and data. Describe the main \
subject and any important context.";

/// Prompt used to describe a user's query image for retrieval.
pub const QUERY_IMAGE_PROMPT: &str = "Describe this image in detail. Focus on key objects, \
text, charts, and the overall context. This description will be used to find relevant \
information in a database.";

/// Produces a text description of an image.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn describe(&self, image: &[u8], prompt: &str) -> Result<String, PipelineError>;
}

/// Captioner backed by an Ollama-hosted vision model via `/api/chat`.
pub struct OllamaCaptioner {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaCaptioner {
    pub fn new(config: &VisionConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::GenerationFailed(format!("vision model: {}", e)))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Captioner for OllamaCaptioner {
    async fn describe(&self, image: &[u8], prompt: &str) -> Result<String, PipelineError> {
        let url = format!("{}/api/chat", self.base_url);
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image);
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": 0.0 },
            "messages": [{
                "role": "user",
                "content": prompt,
                "images": [image_b64],
            }],
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("vision model: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationFailed(format!(
                "vision API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("vision model: {}", e)))?;

        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                PipelineError::GenerationFailed(
                    "invalid vision response: missing message content".to_string(),
                )
            })
    }
}
