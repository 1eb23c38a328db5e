//! JSON-file-persisted vector index.
//!
//! Wraps [`InMemoryIndex`] with load-on-open and save-after-mutation so
//! the CLI keeps its index across invocations. Queries read purely from
//! memory; only structural mutations touch disk. For larger corpora
//! this is the seam where a real vector database would plug in behind
//! the same [`VectorIndex`] trait.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use folio_core::models::{EmbeddingRecord, Modality, RetrievalResult};
use folio_core::store::{memory::InMemoryIndex, VectorIndex};

pub struct FileIndex {
    inner: InMemoryIndex,
    path: PathBuf,
}

impl FileIndex {
    /// Open an index file, creating an empty index if it doesn't exist.
    pub fn open(path: &Path) -> Result<Self> {
        let inner = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read index file: {}", path.display()))?;
            let records: Vec<EmbeddingRecord> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse index file: {}", path.display()))?;
            InMemoryIndex::from_records(records)
        } else {
            InMemoryIndex::new()
        };
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    fn save(&self) -> Result<()> {
        let records = self.inner.snapshot();
        let content = serde_json::to_string(&records)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write index file: {}", self.path.display()))
    }
}

#[async_trait]
impl VectorIndex for FileIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        self.inner.upsert(records).await?;
        self.save()
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        modality: Option<Modality>,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievalResult>> {
        self.inner.query(vector, k, modality, document_ids).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.inner.delete_document(document_id).await?;
        self.save()
    }

    async fn document_ids(&self) -> Result<Vec<String>> {
        self.inner.document_ids().await
    }
}
