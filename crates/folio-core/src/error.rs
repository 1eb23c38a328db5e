//! Pipeline error taxonomy.
//!
//! Every fallible boundary of the pipeline maps into one of these
//! variants so callers can distinguish caller errors (`EmptyQuery`),
//! non-retryable ingestion failures (`UnsupportedFormat`,
//! `CorruptDocument`), exhausted-retry external failures
//! (`EmbeddingUnavailable`, `IndexUnavailable`), abandoned operations
//! (`Timeout`), and the explicit no-evidence outcome (`NoGrounding`).

/// Error returned by pipeline operations.
#[derive(Debug)]
pub enum PipelineError {
    /// The uploaded bytes are not a PDF.
    UnsupportedFormat(String),
    /// The bytes look like a PDF but its pages cannot be parsed.
    CorruptDocument(String),
    /// The embedding capability stayed unreachable after bounded retries.
    EmbeddingUnavailable(String),
    /// A query was issued with neither a text nor an image component.
    EmptyQuery,
    /// The operation exceeded its configured time bound and was abandoned.
    Timeout(String),
    /// The vector index failed after bounded retries.
    IndexUnavailable(String),
    /// A chat-model capability (vision captioning or answer generation)
    /// returned an error or malformed output.
    GenerationFailed(String),
    /// Retrieval produced no chunk above the relevance threshold.
    ///
    /// This is a policy outcome, distinct from a normal answer: the
    /// caller must surface it instead of letting the generator answer
    /// without evidence.
    NoGrounding,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::UnsupportedFormat(e) => write!(f, "unsupported format: {}", e),
            PipelineError::CorruptDocument(e) => write!(f, "corrupt document: {}", e),
            PipelineError::EmbeddingUnavailable(e) => {
                write!(f, "embedding capability unavailable: {}", e)
            }
            PipelineError::EmptyQuery => {
                write!(f, "empty query: provide a text question, an image, or both")
            }
            PipelineError::Timeout(op) => write!(f, "operation timed out: {}", op),
            PipelineError::IndexUnavailable(e) => write!(f, "vector index unavailable: {}", e),
            PipelineError::GenerationFailed(e) => write!(f, "generation failed: {}", e),
            PipelineError::NoGrounding => {
                write!(f, "no grounding found in the indexed documents")
            }
        }
    }
}

impl std::error::Error for PipelineError {}
