use std::sync::Arc;

use docqa_core::error::{codes, AppError};

use crate::embeddings::Embedder;
use crate::evidence::index::read_index;
use crate::evidence::{Chunk, SharedIndex, SimilarityResult, VectorIndex};
use crate::retry::RetryPolicy;

/// A retrieved passage and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct Retriever {
    index: SharedIndex,
    embedder: Arc<dyn Embedder>,
    model: String,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(index: SharedIndex, embedder: Arc<dyn Embedder>, model: impl Into<String>) -> Self {
        Self {
            index,
            embedder,
            model: model.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ranked evidence scoring at least `similarity_threshold`, best first.
    ///
    /// An empty result is not an error.
    pub fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<Evidence>, AppError> {
        let q = query_text.trim();
        if q.is_empty() {
            return Err(AppError::new(codes::INVALID_QUERY, "Query must not be empty"));
        }
        if top_k == 0 {
            return Err(AppError::new(codes::INVALID_QUERY, "top_k must be at least 1"));
        }
        if !similarity_threshold.is_finite() {
            return Err(AppError::new(codes::INVALID_QUERY, "similarity_threshold must be finite")
                .with_details(format!("similarity_threshold={similarity_threshold}")));
        }

        // Embed before taking the lock; a slow model must not stall rebuilds.
        let qv = self
            .retry
            .run("embed_query", || self.embedder.embed(&self.model, q))?;

        let guard = read_index(&self.index)?;
        let raw = guard.search(&qv, top_k)?;
        let raw_len = raw.len();
        let kept = filter_by_threshold(raw, similarity_threshold);

        let mut out = Vec::with_capacity(kept.len());
        for hit in kept {
            let entry = guard.get(&hit.chunk_id).ok_or_else(|| {
                AppError::new(codes::CORRUPT_INDEX, "Search returned an unknown chunk id")
                    .with_details(format!("chunk_id={}", hit.chunk_id))
            })?;
            out.push(Evidence {
                chunk: entry.chunk(),
                score: hit.score,
            });
        }
        drop(guard);

        tracing::debug!(top_k, threshold = similarity_threshold, candidates = raw_len, kept = out.len(), "retrieved");
        Ok(out)
    }
}

/// Keep results scoring `>= threshold`, preserving order.
pub fn filter_by_threshold(results: Vec<SimilarityResult>, threshold: f32) -> Vec<SimilarityResult> {
    results.into_iter().filter(|r| r.score >= threshold).collect()
}
