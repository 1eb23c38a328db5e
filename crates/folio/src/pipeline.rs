//! Request pipeline orchestration.
//!
//! Wires the ingestor, captioner, chunker, embedder, index, retriever,
//! assembler, and generator into the two request-scoped operations:
//! [`Pipeline::upload`] and [`Pipeline::ask`]. Each operation is
//! independent; the index is the only shared mutable state, and
//! structural mutations (upsert/delete) are serialized per document id
//! so a re-ingestion cannot interleave with a delete for the same
//! document.
//!
//! Both operations run under a configured time bound; on expiry the
//! operation is abandoned and surfaces [`PipelineError::Timeout`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use folio_core::assemble::assemble;
use folio_core::chunk::{chunk_units, ChunkParams};
use folio_core::error::PipelineError;
use folio_core::models::{Chunk, Citation, ContentUnit, Document, EmbeddingRecord, UnitKind};
use folio_core::retrieve::{retrieve, QueryVectors, RetrievalParams};
use folio_core::store::VectorIndex;

use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::generate::AnswerGenerator;
use crate::ingest;
use crate::vision::{Captioner, CHUNK_CAPTION_PROMPT, QUERY_IMAGE_PROMPT};

/// Result of an upload operation.
#[derive(Debug)]
pub enum UploadOutcome {
    Ingested { document: Document, chunks: usize },
    /// The identical file is already indexed; nothing was written.
    AlreadyIngested { document_id: String },
}

/// A grounded answer with its ordered citation list.
#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Result of a query operation.
///
/// `NoGrounding` is a first-class outcome: retrieval found nothing
/// above the relevance threshold, so no generation call was made.
#[derive(Debug)]
pub enum AskOutcome {
    Answered(Answer),
    NoGrounding,
}

struct Settings {
    chunking: ChunkParams,
    retrieval: RetrievalParams,
    budget_chars: usize,
    embed_batch_size: usize,
    caption_concurrency: usize,
    upload_timeout: Duration,
    query_timeout: Duration,
}

pub struct Pipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    captioner: Arc<dyn Captioner>,
    generator: Arc<dyn AnswerGenerator>,
    settings: Settings,
    doc_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        captioner: Arc<dyn Captioner>,
        generator: Arc<dyn AnswerGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            index,
            embedder,
            captioner,
            generator,
            settings: Settings {
                chunking: config.chunk_params(),
                retrieval: config.retrieval_params(),
                budget_chars: config.context.budget_chars,
                embed_batch_size: config.embedding.batch_size.max(1),
                caption_concurrency: config.vision.max_concurrent.max(1),
                upload_timeout: Duration::from_secs(config.limits.upload_timeout_secs),
                query_timeout: Duration::from_secs(config.limits.query_timeout_secs),
            },
            doc_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Upload boundary: ingest a PDF, caption its images, chunk, embed,
    /// and index. Idempotent for identical bytes.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<UploadOutcome, PipelineError> {
        let (document, units) = ingest::ingest(bytes, filename)?;
        tokio::time::timeout(self.settings.upload_timeout, self.upload_inner(document, units))
            .await
            .map_err(|_| PipelineError::Timeout("upload".to_string()))?
    }

    async fn upload_inner(
        &self,
        document: Document,
        units: Vec<ContentUnit>,
    ) -> Result<UploadOutcome, PipelineError> {
        let _guard = self.lock_document(&document.id).await;

        let existing = self
            .index
            .document_ids()
            .await
            .map_err(|e| PipelineError::IndexUnavailable(e.to_string()))?;
        if existing.contains(&document.id) {
            return Ok(UploadOutcome::AlreadyIngested {
                document_id: document.id,
            });
        }

        let units = self.caption_images(units).await;
        let chunks = chunk_units(&document, &units, &self.settings.chunking);
        let chunk_count = chunks.len();
        if chunk_count == 0 {
            return Ok(UploadOutcome::Ingested {
                document,
                chunks: 0,
            });
        }

        let records = self.embed_chunks(chunks).await?;
        self.index
            .upsert(records)
            .await
            .map_err(|e| PipelineError::IndexUnavailable(e.to_string()))?;

        Ok(UploadOutcome::Ingested {
            document,
            chunks: chunk_count,
        })
    }

    /// Query boundary: embed the present query modalities, retrieve,
    /// assemble a grounded context, and generate an answer.
    ///
    /// At least one of `question`/`image` must be present. `k` overrides
    /// the configured result count.
    pub async fn ask(
        &self,
        question: Option<&str>,
        image: Option<&[u8]>,
        k: Option<usize>,
    ) -> Result<AskOutcome, PipelineError> {
        let question = question.map(str::trim).filter(|q| !q.is_empty());
        if question.is_none() && image.is_none() {
            return Err(PipelineError::EmptyQuery);
        }
        tokio::time::timeout(self.settings.query_timeout, self.ask_inner(question, image, k))
            .await
            .map_err(|_| PipelineError::Timeout("query".to_string()))?
    }

    async fn ask_inner(
        &self,
        question: Option<&str>,
        image: Option<&[u8]>,
        k: Option<usize>,
    ) -> Result<AskOutcome, PipelineError> {
        let mut queries = QueryVectors::default();
        let mut image_description = None;

        if let Some(q) = question {
            queries.text = Some(embed_query(self.embedder.as_ref(), q).await?);
        }
        if let Some(img) = image {
            let description = self
                .captioner
                .describe(img, QUERY_IMAGE_PROMPT)
                .await?;
            queries.image = Some(embed_query(self.embedder.as_ref(), &description).await?);
            image_description = Some(description);
        }

        let mut params = self.settings.retrieval.clone();
        if let Some(k) = k {
            params.k = k;
        }

        let results = retrieve(self.index.as_ref(), &queries, &params, None).await?;
        let context = assemble(&results, self.settings.budget_chars);
        if context.is_empty() {
            return Ok(AskOutcome::NoGrounding);
        }

        let question_text = match (question, &image_description) {
            (Some(q), Some(d)) => {
                format!("{}\n\n[Information from uploaded image]:\n{}", q, d)
            }
            (Some(q), None) => q.to_string(),
            (None, Some(d)) => format!(
                "What do the documents say about the following?\n\n\
                 [Information from uploaded image]:\n{}",
                d
            ),
            (None, None) => String::new(),
        };

        let text = self
            .generator
            .answer(&question_text, &context.render())
            .await?;

        Ok(AskOutcome::Answered(Answer {
            text,
            citations: context.citations(),
        }))
    }

    /// Remove a document and all its chunks from the index.
    pub async fn delete(&self, document_id: &str) -> Result<(), PipelineError> {
        let _guard = self.lock_document(document_id).await;
        self.index
            .delete_document(document_id)
            .await
            .map_err(|e| PipelineError::IndexUnavailable(e.to_string()))
    }

    /// Document ids currently indexed.
    pub async fn documents(&self) -> Result<Vec<String>, PipelineError> {
        self.index
            .document_ids()
            .await
            .map_err(|e| PipelineError::IndexUnavailable(e.to_string()))
    }

    /// Per-document async lock serializing structural mutations.
    async fn lock_document(&self, document_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.doc_locks.lock().unwrap();
            map.entry(document_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Caption image units concurrently, bounded by a semaphore so the
    /// model-serving process is not overwhelmed.
    ///
    /// Captioning is best effort: a failed caption leaves the unit
    /// uncaptioned and the chunker falls back to a placeholder, the
    /// same non-fatal policy the text extractor applies per page.
    async fn caption_images(&self, units: Vec<ContentUnit>) -> Vec<ContentUnit> {
        let mut units = units;
        let semaphore = Arc::new(Semaphore::new(self.settings.caption_concurrency));
        let mut tasks: JoinSet<(usize, Option<String>)> = JoinSet::new();

        for (i, unit) in units.iter().enumerate() {
            if let UnitKind::Image {
                bytes,
                caption: None,
            } = &unit.kind
            {
                let bytes = bytes.clone();
                let captioner = Arc::clone(&self.captioner);
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let caption = captioner
                        .describe(&bytes, CHUNK_CAPTION_PROMPT)
                        .await
                        .ok()
                        .filter(|c| !c.is_empty());
                    (i, caption)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok((i, Some(text))) = joined {
                if let UnitKind::Image { caption, .. } = &mut units[i].kind {
                    *caption = Some(text);
                }
            }
        }

        units
    }

    /// Embed chunks in batches, preserving order.
    async fn embed_chunks(
        &self,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<EmbeddingRecord>, PipelineError> {
        let mut records = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.settings.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_texts(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::EmbeddingUnavailable(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                records.push(EmbeddingRecord {
                    modality: chunk.modality,
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        Ok(records)
    }
}
