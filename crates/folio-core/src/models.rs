//! Core data models for the ingestion and retrieval pipeline.
//!
//! These types flow from the PDF ingestor through chunking, embedding,
//! the vector index, and finally into the grounded context handed to
//! the answer generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingested PDF document. Immutable once created; re-uploading a
/// changed file produces a new document that supersedes this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the file content and filename.
    pub id: String,
    /// Original filename as uploaded, used in citation labels.
    pub filename: String,
    /// Number of physical pages in the PDF.
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Content modality of a chunk or query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Image => write!(f, "image"),
        }
    }
}

/// A page-scoped piece of extracted document content, prior to chunking.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    pub document_id: String,
    /// 1-indexed physical page number.
    pub page: u32,
    pub kind: UnitKind,
}

/// The two content variants an ingestor can produce.
#[derive(Debug, Clone)]
pub enum UnitKind {
    /// Extracted page text in reading order (best effort).
    Text(String),
    /// An embedded raster image, with a caption once one has been
    /// generated (OCR or VLM description).
    Image {
        bytes: Vec<u8>,
        caption: Option<String>,
    },
}

/// The unit of embedding and retrieval.
///
/// Text chunks hold a segment of page text. Image chunks map 1:1 to an
/// extracted image; their `text` is the caption that bridges them into
/// the text embedding space, and `image` holds the raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Filename of the source document, carried for citation labels.
    pub filename: String,
    /// 1-indexed source page.
    pub page: u32,
    /// Position index within the document, contiguous from 0 across
    /// all modalities. Stable ordering key.
    pub position: i64,
    pub modality: Modality,
    /// Chunk text, or the caption for image chunks.
    pub text: String,
    /// Raw image bytes for image chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    /// SHA-256 of the chunk content, for staleness detection.
    pub hash: String,
}

/// A `(chunk, vector, modality)` triple persisted in the vector index.
///
/// All records in one index share vector dimensionality; the metric is
/// cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub modality: Modality,
}

/// A scored chunk returned from the index or the fused retriever.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Cosine similarity, or a normalized fusion score in `[0, 1]`.
    pub score: f64,
    pub modality: Modality,
}

/// Human-readable source reference attached to an admitted chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Label shown to the user, e.g. `"paper.pdf, p.12"`.
    pub label: String,
    pub document_id: String,
    pub filename: String,
    pub page: u32,
}

impl RetrievalResult {
    /// Deterministic ordering key used to break score ties.
    pub fn tie_break_key(&self) -> (&str, u32, i64) {
        (&self.chunk.document_id, self.chunk.page, self.chunk.position)
    }
}
