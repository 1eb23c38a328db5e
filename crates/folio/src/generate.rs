//! Answer generator adapter.
//!
//! The generation model is an external capability: assembled context
//! and question in, answer text out. The [`AnswerGenerator`] trait
//! keeps it mockable; [`OllamaGenerator`] talks to a locally hosted
//! model through `/api/chat`.

use async_trait::async_trait;
use std::time::Duration;

use folio_core::error::PipelineError;

use crate::config::GenerationConfig;

/// External answer generation capability.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce an answer to `question` using only `context`.
    async fn answer(&self, question: &str, context: &str) -> Result<String, PipelineError>;
}

/// Generator backed by an Ollama-hosted chat model.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::GenerationFailed(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }
}

/// Build the grounded-answer prompt: the model may use only the
/// provided context, so an ungrounded question cannot be answered
/// silently from model memory.
fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "**Your Role**: You are a document analysis assistant.\n\
         **Task**: Based ONLY on the \"Context Information\" below, answer the \"User's Question\".\n\
         ---\n\
         **Context Information**:\n{}\n\
         ---\n\
         **User's Question**:\n{}\n\
         ---\n\
         **Your Answer**:",
        context, question
    )
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn answer(&self, question: &str, context: &str) -> Result<String, PipelineError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": 0.1 },
            "messages": [{
                "role": "user",
                "content": build_prompt(question, context),
            }],
        });

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::Timeout("generation".to_string())
            } else {
                PipelineError::GenerationFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationFailed(format!(
                "generation API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::GenerationFailed(e.to_string()))?;

        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                PipelineError::GenerationFailed(
                    "invalid chat response: missing message content".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_context_and_question() {
        let prompt = build_prompt("What is the revenue?", "[1] (q.pdf, p.3)\nRevenue was $5M.");
        assert!(prompt.contains("Revenue was $5M."));
        assert!(prompt.contains("What is the revenue?"));
        assert!(prompt.contains("Based ONLY on"));
    }
}
