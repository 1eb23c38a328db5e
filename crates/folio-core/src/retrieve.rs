//! Fused multimodal retrieval.
//!
//! A query may carry a text vector, an image vector, or both. Each
//! present modality is searched independently against the index with
//! headroom (`fusion_headroom × k` candidates), then the per-modality
//! result lists are fused into one ranking.
//!
//! Cross-modal score comparison is the sharpest correctness risk here:
//! two embedding spaces are not guaranteed commensurable, so the fusion
//! policy is isolated in [`fuse`] and selected by [`FusionPolicy`]:
//!
//! - [`FusionPolicy::SharedSpace`] — both modalities live in one vector
//!   space (image content is bridged into the text space via captions),
//!   so raw cosine scores merge directly. Queries search the whole
//!   index regardless of chunk modality: a text question can land on an
//!   image chunk through its caption, and an image query on body text.
//! - [`FusionPolicy::MinMaxPerModality`] — each list is min-max
//!   normalized to `[0, 1]` before merging, for independent spaces.
//!   Here each query vector only searches chunks of its own modality,
//!   since cross-space cosine scores are meaningless.
//!
//! With a single modality present, either policy preserves that
//! modality's ranking (min-max is monotonic), so fusion is a no-op.
//!
//! Chunks appearing in both lists are deduplicated by chunk id, keeping
//! the higher fused score. The final list is sorted by score descending
//! with ties broken by `(document_id, page, position)`, truncated to
//! `k`, and filtered by the minimum relevance threshold.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::models::{Modality, RetrievalResult};
use crate::store::VectorIndex;

/// How per-modality result lists are merged into one ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionPolicy {
    /// One shared vector space; merge by raw score.
    SharedSpace,
    /// Independent spaces; min-max normalize each list before merging.
    MinMaxPerModality,
}

/// Retrieval tuning parameters.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Final number of results.
    pub k: usize,
    /// Per-modality candidate multiplier (`k' = fusion_headroom × k`).
    pub fusion_headroom: usize,
    /// Results scoring below this are dropped; an empty final list is
    /// the "no grounding" condition.
    pub min_score: f64,
    pub fusion: FusionPolicy,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 8,
            fusion_headroom: 2,
            min_score: 0.25,
            fusion: FusionPolicy::SharedSpace,
        }
    }
}

/// Embedded query vectors, one per present modality.
#[derive(Debug, Clone, Default)]
pub struct QueryVectors {
    pub text: Option<Vec<f32>>,
    pub image: Option<Vec<f32>>,
}

impl QueryVectors {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}

/// Retrieve a fused, deduplicated, ranked set of chunks for a query.
///
/// `scope` restricts retrieval to the given document ids (the caller's
/// uploaded set); `None` searches everything.
pub async fn retrieve(
    index: &dyn VectorIndex,
    queries: &QueryVectors,
    params: &RetrievalParams,
    scope: Option<&[String]>,
) -> Result<Vec<RetrievalResult>, PipelineError> {
    if queries.is_empty() {
        return Err(PipelineError::EmptyQuery);
    }

    let candidate_k = params.fusion_headroom.max(1) * params.k;

    let mut lists: Vec<Vec<RetrievalResult>> = Vec::new();
    for (vector, modality) in [
        (queries.text.as_ref(), Modality::Text),
        (queries.image.as_ref(), Modality::Image),
    ] {
        if let Some(v) = vector {
            // In a shared vector space any chunk is a candidate for any
            // query vector; with independent spaces a vector is only
            // comparable against chunks of its own modality.
            let modality_filter = match params.fusion {
                FusionPolicy::SharedSpace => None,
                FusionPolicy::MinMaxPerModality => Some(modality),
            };
            let list = index
                .query(v, candidate_k, modality_filter, scope)
                .await
                .map_err(|e| PipelineError::IndexUnavailable(e.to_string()))?;
            lists.push(list);
        }
    }

    let fused = fuse(lists, params.k, params.fusion);
    Ok(fused
        .into_iter()
        .filter(|r| r.score >= params.min_score)
        .collect())
}

/// Merge per-modality result lists into one ranking of at most `k`.
///
/// This is the single swap point for the normalization strategy.
pub fn fuse(
    lists: Vec<Vec<RetrievalResult>>,
    k: usize,
    policy: FusionPolicy,
) -> Vec<RetrievalResult> {
    let mut best: HashMap<String, RetrievalResult> = HashMap::new();

    for list in lists {
        let scored = match policy {
            FusionPolicy::SharedSpace => list,
            FusionPolicy::MinMaxPerModality => normalize_scores(list),
        };
        for result in scored {
            match best.get(&result.chunk.id) {
                Some(existing) if existing.score >= result.score => {}
                _ => {
                    best.insert(result.chunk.id.clone(), result);
                }
            }
        }
    }

    let mut merged: Vec<RetrievalResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.tie_break_key().cmp(&b.tie_break_key()))
    });
    merged.truncate(k);
    merged
}

/// Min-max normalize a result list's scores to `[0.0, 1.0]` in place.
///
/// If all scores are equal, they normalize to `1.0`.
pub fn normalize_scores(mut list: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    if list.is_empty() {
        return list;
    }

    let s_min = list.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
    let s_max = list
        .iter()
        .map(|r| r.score)
        .fold(f64::NEG_INFINITY, f64::max);

    for r in &mut list {
        r.score = if (s_max - s_min).abs() < f64::EPSILON {
            1.0
        } else {
            (r.score - s_min) / (s_max - s_min)
        };
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::store::memory::InMemoryIndex;

    fn result(chunk_id: &str, doc_id: &str, page: u32, pos: i64, score: f64, modality: Modality) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id: chunk_id.to_string(),
                document_id: doc_id.to_string(),
                filename: format!("{}.pdf", doc_id),
                page,
                position: pos,
                modality,
                text: String::new(),
                image: None,
                hash: String::new(),
            },
            score,
            modality,
        }
    }

    #[test]
    fn normalize_maps_to_unit_interval() {
        let list = vec![
            result("c1", "d1", 1, 0, 10.0, Modality::Text),
            result("c2", "d1", 2, 1, 5.0, Modality::Text),
            result("c3", "d1", 3, 2, 0.0, Modality::Text),
        ];
        let normed = normalize_scores(list);
        assert!((normed[0].score - 1.0).abs() < 1e-9);
        assert!((normed[1].score - 0.5).abs() < 1e-9);
        assert!((normed[2].score - 0.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_all_equal_scores_to_one() {
        let list = vec![
            result("c1", "d1", 1, 0, 0.3, Modality::Text),
            result("c2", "d1", 2, 1, 0.3, Modality::Text),
        ];
        for r in normalize_scores(list) {
            assert!((r.score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn single_modality_fusion_is_noop_on_ranking() {
        let list = vec![
            result("c1", "d1", 1, 0, 0.9, Modality::Text),
            result("c2", "d1", 2, 1, 0.7, Modality::Text),
            result("c3", "d2", 1, 0, 0.4, Modality::Text),
        ];
        for policy in [FusionPolicy::SharedSpace, FusionPolicy::MinMaxPerModality] {
            let fused = fuse(vec![list.clone()], 3, policy);
            let ids: Vec<&str> = fused.iter().map(|r| r.chunk.id.as_str()).collect();
            assert_eq!(ids, vec!["c1", "c2", "c3"], "policy {:?}", policy);
        }
    }

    #[test]
    fn duplicate_chunk_keeps_higher_score() {
        let text_list = vec![
            result("c1", "d1", 1, 0, 1.0, Modality::Text),
            result("shared", "d1", 2, 1, 0.2, Modality::Text),
        ];
        let image_list = vec![
            result("shared", "d1", 2, 1, 0.8, Modality::Image),
            result("c4", "d2", 1, 0, 0.1, Modality::Image),
        ];
        let fused = fuse(vec![text_list, image_list], 10, FusionPolicy::MinMaxPerModality);
        let shared = fused.iter().find(|r| r.chunk.id == "shared").unwrap();
        // In the image list "shared" is the max, so it normalizes to 1.0;
        // in the text list it is the min (0.0). Higher wins.
        assert!((shared.score - 1.0).abs() < 1e-9);
        assert_eq!(fused.iter().filter(|r| r.chunk.id == "shared").count(), 1);
    }

    #[test]
    fn ties_break_by_document_page_position() {
        let list = vec![
            result("cz", "d2", 1, 0, 0.5, Modality::Text),
            result("cy", "d1", 3, 7, 0.5, Modality::Text),
            result("cx", "d1", 3, 2, 0.5, Modality::Text),
        ];
        let fused = fuse(vec![list], 3, FusionPolicy::SharedSpace);
        let ids: Vec<&str> = fused.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["cx", "cy", "cz"]);
    }

    #[test]
    fn truncates_to_k() {
        let list: Vec<RetrievalResult> = (0..10)
            .map(|i| result(&format!("c{}", i), "d1", 1, i, 1.0 - i as f64 * 0.05, Modality::Text))
            .collect();
        let fused = fuse(vec![list], 3, FusionPolicy::SharedSpace);
        assert_eq!(fused.len(), 3);
    }

    #[tokio::test]
    async fn empty_query_rejected() {
        let index = InMemoryIndex::new();
        let err = retrieve(
            &index,
            &QueryVectors::default(),
            &RetrievalParams::default(),
            None,
        )
        .await;
        assert!(matches!(err, Err(PipelineError::EmptyQuery)));
    }

    #[tokio::test]
    async fn shared_space_text_query_reaches_image_chunks() {
        use crate::models::EmbeddingRecord;
        let index = InMemoryIndex::new();
        // The image chunk's caption vector matches the query; the text
        // chunk is orthogonal.
        index
            .upsert(vec![
                EmbeddingRecord {
                    chunk: result("caption", "d1", 2, 1, 0.0, Modality::Image).chunk,
                    vector: vec![1.0, 0.0],
                    modality: Modality::Image,
                },
                EmbeddingRecord {
                    chunk: result("body", "d1", 1, 0, 0.0, Modality::Text).chunk,
                    vector: vec![0.0, 1.0],
                    modality: Modality::Text,
                },
            ])
            .await
            .unwrap();

        let queries = QueryVectors {
            text: Some(vec![1.0, 0.0]),
            image: None,
        };
        let results = retrieve(&index, &queries, &RetrievalParams::default(), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "caption");
        assert_eq!(results[0].modality, Modality::Image);
    }

    #[tokio::test]
    async fn minmax_policy_keeps_queries_within_their_modality() {
        use crate::models::EmbeddingRecord;
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                EmbeddingRecord {
                    chunk: result("caption", "d1", 2, 1, 0.0, Modality::Image).chunk,
                    vector: vec![1.0, 0.0],
                    modality: Modality::Image,
                },
                EmbeddingRecord {
                    chunk: result("body", "d1", 1, 0, 0.0, Modality::Text).chunk,
                    vector: vec![0.9, 0.1],
                    modality: Modality::Text,
                },
            ])
            .await
            .unwrap();

        let params = RetrievalParams {
            fusion: FusionPolicy::MinMaxPerModality,
            min_score: 0.0,
            ..RetrievalParams::default()
        };
        let queries = QueryVectors {
            text: Some(vec![1.0, 0.0]),
            image: None,
        };
        let results = retrieve(&index, &queries, &params, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "body");
    }

    #[tokio::test]
    async fn min_score_threshold_filters_results() {
        use crate::models::EmbeddingRecord;
        let index = InMemoryIndex::new();
        let mk = |id: &str, v: Vec<f32>| EmbeddingRecord {
            chunk: result(id, "d1", 1, 0, 0.0, Modality::Text).chunk,
            vector: v,
            modality: Modality::Text,
        };
        index
            .upsert(vec![mk("close", vec![1.0, 0.0]), mk("far", vec![0.0, 1.0])])
            .await
            .unwrap();

        let params = RetrievalParams {
            min_score: 0.5,
            ..RetrievalParams::default()
        };
        let queries = QueryVectors {
            text: Some(vec![1.0, 0.0]),
            image: None,
        };
        let results = retrieve(&index, &queries, &params, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "close");
    }
}
