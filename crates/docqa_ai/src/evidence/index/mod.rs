//! Nearest-neighbor store over chunk embeddings.
//!
//! `VectorIndex` is the capability surface; `MemoryIndex` and `DiskIndex` differ
//! only in how they persist. Pick one with [`new_index`].

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use docqa_core::config::{DistanceMetric, IndexBackend};
use docqa_core::error::{codes, AppError};

use super::model::{IndexEntry, SimilarityResult};

mod disk;
mod flat;
mod memory;
pub mod similarity;

pub use disk::DiskIndex;
pub use memory::MemoryIndex;

/// Bumped whenever the on-disk layout of either backend changes.
pub const INDEX_FORMAT_VERSION: u32 = 2;

pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> IndexBackend;
    fn metric(&self) -> DistanceMetric;
    fn dimension(&self) -> usize;

    /// Append entries in order. Does not deduplicate by chunk id.
    fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), AppError>;

    /// Top `top_k` by score, highest first; ties keep insertion order.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>, AppError>;

    fn get(&self, chunk_id: &str) -> Option<&IndexEntry>;

    /// Remove every entry whose id is listed. Remaining entries keep their relative order.
    fn remove(&mut self, chunk_ids: &[String]) -> usize;

    fn save(&self, path: &Path) -> Result<(), AppError>;

    /// Replace the contents with the index stored at `path`.
    ///
    /// Fails with `CORRUPT_INDEX` when the stored dimension, metric or format
    /// version does not match this index, or a stored vector is one `add`
    /// would reject. The index is left unchanged on failure.
    fn load(&mut self, path: &Path) -> Result<(), AppError>;

    fn size(&self) -> usize;
    fn clear(&mut self);
}

pub fn new_index(backend: IndexBackend, metric: DistanceMetric, dimension: usize) -> Box<dyn VectorIndex> {
    match backend {
        IndexBackend::Memory => Box::new(MemoryIndex::new(metric, dimension)),
        IndexBackend::Disk => Box::new(DiskIndex::new(metric, dimension)),
    }
}

/// The engine's active index together with the committed generation it holds.
///
/// `generation` is `None` for an index that has not been loaded from or
/// committed to a state directory. Derefs to the index itself.
pub struct LiveIndex {
    pub generation: Option<String>,
    pub index: Box<dyn VectorIndex>,
}

impl LiveIndex {
    pub fn new(index: Box<dyn VectorIndex>, generation: Option<String>) -> Self {
        Self { generation, index }
    }

    /// Swap in `index` as the contents of `generation`.
    pub fn install(&mut self, index: Box<dyn VectorIndex>, generation: Option<String>) {
        self.index = index;
        self.generation = generation;
    }
}

impl Deref for LiveIndex {
    type Target = dyn VectorIndex;

    fn deref(&self) -> &Self::Target {
        &*self.index
    }
}

impl DerefMut for LiveIndex {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.index
    }
}

/// Searches take the read side; rebuilds and reloads take the write side.
pub type SharedIndex = Arc<RwLock<LiveIndex>>;

/// Share an index that does not correspond to any committed generation yet.
pub fn share(index: Box<dyn VectorIndex>) -> SharedIndex {
    share_generation(index, None)
}

pub fn share_generation(index: Box<dyn VectorIndex>, generation: Option<String>) -> SharedIndex {
    Arc::new(RwLock::new(LiveIndex::new(index, generation)))
}

pub fn read_index(index: &SharedIndex) -> Result<RwLockReadGuard<'_, LiveIndex>, AppError> {
    index
        .read()
        .map_err(|_| AppError::new(codes::INDEX_LOCK_POISONED, "Index lock poisoned by a panicked writer"))
}

pub fn write_index(index: &SharedIndex) -> Result<RwLockWriteGuard<'_, LiveIndex>, AppError> {
    index
        .write()
        .map_err(|_| AppError::new(codes::INDEX_LOCK_POISONED, "Index lock poisoned by a panicked writer"))
}

/// Check dimension and finiteness; for cosine, scale to unit length.
pub fn prepare_vector(
    mut v: Vec<f32>,
    dimension: usize,
    metric: DistanceMetric,
) -> Result<Vec<f32>, AppError> {
    if v.len() != dimension {
        return Err(AppError::new(
            codes::EMBEDDING_FAILURE,
            "Embedding dimension does not match the index",
        )
        .with_details(format!("expected={dimension}; got={}", v.len())));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(AppError::new(
            codes::EMBEDDING_FAILURE,
            "Embedding contains non-finite values",
        ));
    }
    if metric == DistanceMetric::Cosine {
        let norm = similarity::l2_norm(&v);
        if norm == 0.0 {
            return Err(AppError::new(
                codes::EMBEDDING_FAILURE,
                "Embedding norm is zero",
            ));
        }
        similarity::normalize(&mut v, norm);
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::evidence::model::EntryMeta;

    fn entry(id: &str, v: &[f32]) -> IndexEntry {
        IndexEntry {
            chunk_id: id.to_string(),
            embedding: v.to_vec(),
            meta: EntryMeta {
                document_id: "doc.txt".to_string(),
                position: 0,
                text: format!("text of {id}"),
            },
        }
    }

    fn ids(results: &[SimilarityResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk_id.as_str()).collect()
    }

    fn both_backends(metric: DistanceMetric) -> Vec<Box<dyn VectorIndex>> {
        vec![
            new_index(IndexBackend::Memory, metric, 2),
            new_index(IndexBackend::Disk, metric, 2),
        ]
    }

    #[test]
    fn search_orders_by_score_and_breaks_ties_by_insertion() {
        for mut index in both_backends(DistanceMetric::Cosine) {
            index
                .add(vec![
                    entry("low", &[0.0, 1.0]),
                    entry("tie-first", &[1.0, 1.0]),
                    entry("best", &[1.0, 0.0]),
                    entry("tie-second", &[2.0, 2.0]),
                ])
                .unwrap();

            let results = index.search(&[1.0, 0.2], 4).unwrap();
            assert_eq!(ids(&results), vec!["best", "tie-first", "tie-second", "low"]);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
            assert_eq!(results[1].score, results[2].score);
        }
    }

    #[test]
    fn cosine_normalizes_stored_and_query_vectors() {
        let mut index = MemoryIndex::new(DistanceMetric::Cosine, 2);
        index.add(vec![entry("a", &[10.0, 0.0])]).unwrap();
        let stored = &index.get("a").unwrap().embedding;
        assert_eq!(stored, &vec![1.0, 0.0]);

        let results = index.search(&[0.0, 5.0], 1).unwrap();
        assert!(results[0].score.abs() < 1e-6);
        let results = index.search(&[3.0, 0.0], 1).unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_metric_keeps_raw_magnitudes() {
        let mut index = MemoryIndex::new(DistanceMetric::Dot, 2);
        index
            .add(vec![entry("small", &[1.0, 0.0]), entry("large", &[3.0, 0.0])])
            .unwrap();
        let results = index.search(&[2.0, 0.0], 2).unwrap();
        assert_eq!(ids(&results), vec!["large", "small"]);
        assert_eq!(results[0].score, 6.0);
    }

    #[test]
    fn search_never_pads_past_index_size() {
        let mut index = MemoryIndex::new(DistanceMetric::Cosine, 2);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
        index.add(vec![entry("only", &[1.0, 0.0])]).unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap().len(), 1);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_vectors_without_partial_insert() {
        let mut index = MemoryIndex::new(DistanceMetric::Cosine, 2);
        let err = index
            .add(vec![entry("ok", &[1.0, 0.0]), entry("zero", &[0.0, 0.0])])
            .unwrap_err();
        assert_eq!(err.code, codes::EMBEDDING_FAILURE);
        assert_eq!(index.size(), 0);

        let err = index.add(vec![entry("short", &[1.0])]).unwrap_err();
        assert_eq!(err.code, codes::EMBEDDING_FAILURE);

        let err = index.search(&[0.0, 0.0], 1).unwrap_err();
        assert_eq!(err.code, codes::EMBEDDING_FAILURE);
    }

    #[test]
    fn add_does_not_deduplicate() {
        let mut index = MemoryIndex::new(DistanceMetric::Cosine, 2);
        index.add(vec![entry("dup", &[1.0, 0.0])]).unwrap();
        index.add(vec![entry("dup", &[1.0, 0.0])]).unwrap();
        assert_eq!(index.size(), 2);
    }

    #[test]
    fn remove_keeps_relative_order_and_clear_empties() {
        for mut index in both_backends(DistanceMetric::Cosine) {
            index
                .add(vec![
                    entry("a", &[1.0, 0.0]),
                    entry("b", &[1.0, 0.0]),
                    entry("c", &[1.0, 0.0]),
                ])
                .unwrap();
            assert_eq!(index.remove(&["b".to_string(), "missing".to_string()]), 1);
            assert_eq!(index.size(), 2);
            assert!(index.get("b").is_none());
            assert_eq!(index.get("c").unwrap().chunk_id, "c");
            assert_eq!(ids(&index.search(&[1.0, 0.0], 3).unwrap()), vec!["a", "c"]);

            index.clear();
            assert_eq!(index.size(), 0);
            assert!(index.get("a").is_none());
        }
    }
}
