use std::path::Path;

use docqa_core::config::{DistanceMetric, IndexBackend};
use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::flat::FlatStore;
use super::{VectorIndex, INDEX_FORMAT_VERSION};
use crate::evidence::fsutil::{corrupt, read_state_file, write_atomic};
use crate::evidence::model::{IndexEntry, SimilarityResult};

/// Entries live in memory; `save` writes one self-describing JSON document.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    store: FlatStore,
}

#[derive(Debug, Serialize, Deserialize)]
struct MemoryIndexFile {
    format_version: u32,
    backend: IndexBackend,
    metric: DistanceMetric,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl MemoryIndex {
    pub fn new(metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            store: FlatStore::new(metric, dimension),
        }
    }
}

impl VectorIndex for MemoryIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Memory
    }

    fn metric(&self) -> DistanceMetric {
        self.store.metric
    }

    fn dimension(&self) -> usize {
        self.store.dimension
    }

    fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), AppError> {
        self.store.add(entries)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>, AppError> {
        self.store.search(query, top_k)
    }

    fn get(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.store.get(chunk_id)
    }

    fn remove(&mut self, chunk_ids: &[String]) -> usize {
        self.store.remove(chunk_ids)
    }

    fn save(&self, path: &Path) -> Result<(), AppError> {
        let file = MemoryIndexFile {
            format_version: INDEX_FORMAT_VERSION,
            backend: IndexBackend::Memory,
            metric: self.store.metric,
            dimension: self.store.dimension,
            entries: self.store.entries().to_vec(),
        };
        let json = serde_json::to_vec(&file).map_err(|e| {
            AppError::new(codes::STATE_IO_FAILURE, "Failed to encode index")
                .with_details(e.to_string())
        })?;
        write_atomic(path, &json)?;
        tracing::debug!(path = %path.display(), entries = self.store.len(), "index saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), AppError> {
        let bytes = read_state_file(path)?;
        let file: MemoryIndexFile = serde_json::from_slice(&bytes)
            .map_err(|e| corrupt("Failed to decode index", path, e))?;

        if file.format_version != INDEX_FORMAT_VERSION {
            return Err(corrupt(
                "Unsupported index format version",
                path,
                format!("expected={INDEX_FORMAT_VERSION}; got={}", file.format_version),
            ));
        }
        if file.backend != IndexBackend::Memory {
            return Err(corrupt(
                "Index was written by a different backend",
                path,
                format!("backend={:?}", file.backend),
            ));
        }
        check_header(path, self.store.metric, self.store.dimension, file.metric, file.dimension)?;

        self.store.replace(path, file.entries)?;
        tracing::debug!(path = %path.display(), entries = self.store.len(), "index loaded");
        Ok(())
    }

    fn size(&self) -> usize {
        self.store.len()
    }

    fn clear(&mut self) {
        self.store.clear();
    }
}

pub(super) fn check_header(
    path: &Path,
    metric: DistanceMetric,
    dimension: usize,
    stored_metric: DistanceMetric,
    stored_dimension: usize,
) -> Result<(), AppError> {
    if stored_dimension != dimension {
        return Err(corrupt(
            "Stored index dimension does not match the configured embedding dimension",
            path,
            format!("configured={dimension}; stored={stored_dimension}"),
        ));
    }
    if stored_metric != metric {
        return Err(corrupt(
            "Stored index metric does not match the configured distance metric",
            path,
            format!("configured={}; stored={}", metric.as_str(), stored_metric.as_str()),
        ));
    }
    Ok(())
}
