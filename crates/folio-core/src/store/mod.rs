//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the pipeline's only shared mutable
//! resource. It wraps whatever vector database the application brings;
//! the pipeline needs just four operations: upsert, nearest-neighbor
//! query with modality/document filtering, per-document delete, and
//! document enumeration.
//!
//! Consistency contract: a `query` issued after an `upsert` returns by
//! the same caller must observe the upserted records. Implementations
//! must be `Send + Sync`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EmbeddingRecord, Modality, RetrievalResult};

/// Abstract vector store over `(vector, chunk metadata)` pairs.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records, replacing any existing record with the same
    /// chunk id. All vectors in one index must share dimensionality.
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()>;

    /// Return the top-`k` records by cosine similarity to `vector`,
    /// ordered by score descending with ties broken by
    /// `(document_id, page, position)`.
    ///
    /// `modality` restricts results to one modality; `document_ids`
    /// scopes results to a caller's document set.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        modality: Option<Modality>,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievalResult>>;

    /// Remove every record belonging to `document_id`.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Distinct document ids currently present in the index.
    async fn document_ids(&self) -> Result<Vec<String>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
