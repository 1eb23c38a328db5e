//! In-memory [`VectorIndex`] implementation.
//!
//! Uses a `Vec` of records behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over all stored vectors. Serves as the
//! reference implementation for tests and as the backing structure for
//! the application's persisted index.

use std::collections::BTreeSet;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{EmbeddingRecord, Modality, RetrievalResult};

use super::{cosine_similarity, VectorIndex};

/// Brute-force in-memory vector index.
pub struct InMemoryIndex {
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild an index from previously persisted records.
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Snapshot of all records, for persistence.
    pub fn snapshot(&self) -> Vec<EmbeddingRecord> {
        self.records.read().unwrap().clone()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let mut stored = self.records.write().unwrap();

        if let Some(dims) = stored
            .first()
            .map(|r| r.vector.len())
            .or_else(|| records.first().map(|r| r.vector.len()))
        {
            if let Some(bad) = records.iter().find(|r| r.vector.len() != dims) {
                bail!(
                    "vector dimensionality mismatch: index holds {}, got {} for chunk {}",
                    dims,
                    bad.vector.len(),
                    bad.chunk.id
                );
            }
        }

        let incoming: BTreeSet<&str> = records.iter().map(|r| r.chunk.id.as_str()).collect();
        stored.retain(|r| !incoming.contains(r.chunk.id.as_str()));
        stored.extend(records);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        modality: Option<Modality>,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievalResult>> {
        let stored = self.records.read().unwrap();
        let mut results: Vec<RetrievalResult> = stored
            .iter()
            .filter(|r| modality.map(|m| r.modality == m).unwrap_or(true))
            .filter(|r| {
                document_ids
                    .map(|ids| ids.iter().any(|id| id == &r.chunk.document_id))
                    .unwrap_or(true)
            })
            .map(|r| RetrievalResult {
                chunk: r.chunk.clone(),
                score: cosine_similarity(vector, &r.vector) as f64,
                modality: r.modality,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.tie_break_key().cmp(&b.tie_break_key()))
        });
        results.truncate(k);
        Ok(results)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut stored = self.records.write().unwrap();
        stored.retain(|r| r.chunk.document_id != document_id);
        Ok(())
    }

    async fn document_ids(&self) -> Result<Vec<String>> {
        let stored = self.records.read().unwrap();
        let ids: BTreeSet<String> = stored.iter().map(|r| r.chunk.document_id.clone()).collect();
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn record(chunk_id: &str, doc_id: &str, page: u32, pos: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk: Chunk {
                id: chunk_id.to_string(),
                document_id: doc_id.to_string(),
                filename: format!("{}.pdf", doc_id),
                page,
                position: pos,
                modality: Modality::Text,
                text: format!("chunk {}", chunk_id),
                image: None,
                hash: String::new(),
            },
            vector,
            modality: Modality::Text,
        }
    }

    #[tokio::test]
    async fn query_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                record("c1", "d1", 1, 0, vec![1.0, 0.0]),
                record("c2", "d1", 2, 1, vec![0.0, 1.0]),
                record("c3", "d2", 1, 0, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0], 3, None, None).await.unwrap();
        assert_eq!(results[0].chunk.id, "c1");
        assert_eq!(results[1].chunk.id, "c3");
        assert_eq!(results[2].chunk.id, "c2");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn ties_break_deterministically() {
        let index = InMemoryIndex::new();
        // Identical vectors: identical scores, order must come from
        // (document_id, page, position).
        index
            .upsert(vec![
                record("cb", "d2", 1, 0, vec![1.0, 0.0]),
                record("ca", "d1", 5, 3, vec![1.0, 0.0]),
                record("cc", "d1", 2, 1, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0], 3, None, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["cc", "ca", "cb"]);
    }

    #[tokio::test]
    async fn upsert_replaces_same_chunk_id() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![record("c1", "d1", 1, 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(vec![record("c1", "d1", 1, 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        let results = index.query(&[0.0, 1.0], 10, None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dimensionality_mismatch_rejected() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![record("c1", "d1", 1, 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let err = index
            .upsert(vec![record("c2", "d1", 1, 1, vec![1.0, 0.0, 0.0])])
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn delete_document_removes_all_records() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                record("c1", "d1", 1, 0, vec![1.0, 0.0]),
                record("c2", "d1", 2, 1, vec![0.9, 0.1]),
                record("c3", "d2", 1, 0, vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        index.delete_document("d1").await.unwrap();

        let results = index.query(&[1.0, 0.0], 10, None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, "d2");
        assert_eq!(index.document_ids().await.unwrap(), vec!["d2"]);
    }

    #[tokio::test]
    async fn modality_and_document_filters() {
        let index = InMemoryIndex::new();
        let mut img = record("c2", "d1", 2, 1, vec![1.0, 0.0]);
        img.modality = Modality::Image;
        img.chunk.modality = Modality::Image;
        index
            .upsert(vec![record("c1", "d1", 1, 0, vec![1.0, 0.0]), img])
            .await
            .unwrap();

        let only_images = index
            .query(&[1.0, 0.0], 10, Some(Modality::Image), None)
            .await
            .unwrap();
        assert_eq!(only_images.len(), 1);
        assert_eq!(only_images[0].chunk.id, "c2");

        let scoped = index
            .query(&[1.0, 0.0], 10, None, Some(&["d2".to_string()]))
            .await
            .unwrap();
        assert!(scoped.is_empty());
    }
}
