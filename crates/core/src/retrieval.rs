use std::collections::HashMap;
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::error::{RetrieveError, StoreError};
use crate::models::{Category, RetrievalOptions, RetrievedPassage};
use crate::store::VectorStore;

/// Query-side entry point: embeds the question and ranks stored chunks.
///
/// Construction fails fast when the store and the embedder disagree on
/// dimensions or model identity, so a misconfigured pairing cannot
/// serve silently degraded results.
pub struct RetrievalFacade {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    options: RetrievalOptions,
}

impl RetrievalFacade {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        options: RetrievalOptions,
    ) -> Result<Self, StoreError> {
        if store.dimensions() != embedder.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            });
        }
        if store.embedder_model() != embedder.model_id() {
            return Err(StoreError::ModelMismatch {
                stored: store.embedder_model().to_string(),
                configured: embedder.model_id().to_string(),
            });
        }
        Ok(Self {
            store,
            embedder,
            options,
        })
    }

    /// Returns up to `k` passages scoring at or above the configured
    /// threshold, with at most `per_source_cap` passages per source
    /// document. A thin result set is returned as-is rather than padded
    /// with weak matches.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        category: Option<Category>,
    ) -> Result<Vec<RetrievedPassage>, RetrieveError> {
        if query.trim().is_empty() {
            return Err(RetrieveError::EmptyQuery);
        }

        let vector = self.embedder.embed(query).await?;

        // Over-fetch so the threshold and the per-source cap still
        // leave enough candidates to fill k slots.
        let cap = self.options.per_source_cap.max(1);
        let headroom = k.saturating_mul(cap).saturating_mul(2).max(k);
        let hits = self.store.query(&vector, headroom, category)?;

        // When one source dominates the window, capped-out candidates
        // can hide qualifying passages from other sources behind the
        // headroom cutoff; a full rescan settles it.
        let window_exhausted = hits.len() == headroom;
        let passages = self.select_passages(hits, k, cap);
        if passages.len() < k && window_exhausted {
            let hits = self.store.query(&vector, usize::MAX, category)?;
            return Ok(self.select_passages(hits, k, cap));
        }

        Ok(passages)
    }

    fn select_passages(
        &self,
        hits: Vec<(crate::models::EmbeddingRecord, f32)>,
        k: usize,
        cap: usize,
    ) -> Vec<RetrievedPassage> {
        let mut per_source: HashMap<String, usize> = HashMap::new();
        let mut passages = Vec::with_capacity(k);

        for (record, score) in hits {
            if score < self.options.min_score {
                // Hits are sorted, nothing further can pass.
                break;
            }
            let taken = per_source.entry(record.source_id.clone()).or_insert(0);
            if *taken >= cap {
                continue;
            }
            *taken += 1;
            passages.push(RetrievedPassage {
                text: record.text,
                source_id: record.source_id,
                category: record.category,
                score,
            });
            if passages.len() == k {
                break;
            }
        }

        passages
    }
}
