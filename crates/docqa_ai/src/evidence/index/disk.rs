use std::fs;
use std::path::{Path, PathBuf};

use docqa_core::config::{DistanceMetric, IndexBackend};
use docqa_core::document::sha256_hex;
use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::flat::FlatStore;
use super::memory::check_header;
use super::{VectorIndex, INDEX_FORMAT_VERSION};
use crate::evidence::fsutil::{corrupt, read_state_file, write_atomic};
use crate::evidence::model::{EntryMeta, IndexEntry, SimilarityResult};

/// Same search as `MemoryIndex`, persisted as a JSON header (ids, metadata,
/// checksum) plus a packed little-endian `f32` vector block next to it.
///
/// The block file is named after its checksum and the header names the block,
/// so renaming the header is the single step that publishes a save.
#[derive(Debug, Clone)]
pub struct DiskIndex {
    store: FlatStore,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskIndexHeader {
    format_version: u32,
    backend: IndexBackend,
    metric: DistanceMetric,
    dimension: usize,
    count: usize,
    vectors_file: String,
    vectors_sha256: String,
    entries: Vec<DiskEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    chunk_id: String,
    meta: EntryMeta,
}

impl DiskIndex {
    pub fn new(metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            store: FlatStore::new(metric, dimension),
        }
    }
}

fn header_stem(header_path: &Path) -> String {
    header_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `index.json` + checksum -> `index.<first 16 hex digits>.bin`.
fn vectors_file_name(header_path: &Path, sha256: &str) -> String {
    format!("{}.{}.bin", header_stem(header_path), &sha256[..16.min(sha256.len())])
}

fn sibling(header_path: &Path, name: &str) -> PathBuf {
    header_path.with_file_name(name)
}

/// Delete vector blocks of earlier saves. Best effort.
fn prune_blocks(header_path: &Path, keep: &str) {
    let Some(dir) = header_path.parent() else {
        return;
    };
    let prefix = format!("{}.", header_stem(header_path));
    let Ok(rd) = fs::read_dir(dir) else {
        return;
    };
    for entry in rd.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != keep && name.starts_with(&prefix) && name.ends_with(".bin") {
            if let Err(e) = fs::remove_file(entry.path()) {
                tracing::warn!(file = %name, err = %e, "failed to remove old vector block");
            }
        }
    }
}

impl VectorIndex for DiskIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Disk
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
        let entries = self.store.entries();
        let mut block = Vec::with_capacity(entries.len() * self.store.dimension * 4);
        for e in entries {
            for x in &e.embedding {
                block.extend_from_slice(&x.to_le_bytes());
            }
        }

        let vectors_sha256 = sha256_hex(&block);
        let vectors_file = vectors_file_name(path, &vectors_sha256);
        let header = DiskIndexHeader {
            format_version: INDEX_FORMAT_VERSION,
            backend: IndexBackend::Disk,
            metric: self.store.metric,
            dimension: self.store.dimension,
            count: entries.len(),
            vectors_file: vectors_file.clone(),
            vectors_sha256,
            entries: entries
                .iter()
                .map(|e| DiskEntry {
                    chunk_id: e.chunk_id.clone(),
                    meta: e.meta.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_vec(&header).map_err(|e| {
            AppError::new(codes::STATE_IO_FAILURE, "Failed to encode index header")
                .with_details(e.to_string())
        })?;

        // The previous header keeps pointing at its own block until this rename.
        write_atomic(&sibling(path, &vectors_file), &block)?;
        write_atomic(path, &json)?;
        prune_blocks(path, &vectors_file);
        tracing::debug!(path = %path.display(), entries = entries.len(), bytes = block.len(), "index saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), AppError> {
        let header_bytes = read_state_file(path)?;
        let header: DiskIndexHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| corrupt("Failed to decode index header", path, e))?;

        if header.format_version != INDEX_FORMAT_VERSION {
            return Err(corrupt(
                "Unsupported index format version",
                path,
                format!("expected={INDEX_FORMAT_VERSION}; got={}", header.format_version),
            ));
        }
        if header.backend != IndexBackend::Disk {
            return Err(corrupt(
                "Index was written by a different backend",
                path,
                format!("backend={:?}", header.backend),
            ));
        }
        check_header(path, self.store.metric, self.store.dimension, header.metric, header.dimension)?;
        if header.entries.len() != header.count {
            return Err(corrupt(
                "Index header entry count mismatch",
                path,
                format!("count={}; entries={}", header.count, header.entries.len()),
            ));
        }

        if header.vectors_file.is_empty()
            || header.vectors_file.contains(['/', '\\'])
            || header.vectors_file.starts_with('.')
        {
            return Err(corrupt(
                "Index header names an invalid vector block",
                path,
                format!("vectors_file={:?}", header.vectors_file),
            ));
        }
        let bin_path = sibling(path, &header.vectors_file);
        let block = read_state_file(&bin_path)?;
        let expected_len = header.count * header.dimension * 4;
        if block.len() != expected_len {
            return Err(corrupt(
                "Vector block has the wrong length",
                &bin_path,
                format!("expected={expected_len}; got={}", block.len()),
            ));
        }
        if sha256_hex(&block) != header.vectors_sha256 {
            return Err(corrupt("Vector block checksum mismatch", &bin_path, "sha256 differs"));
        }

        let dim = header.dimension;
        let entries = header
            .entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                let start = i * dim * 4;
                let embedding = block[start..start + dim * 4]
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                IndexEntry {
                    chunk_id: e.chunk_id,
                    embedding,
                    meta: e.meta,
                }
            })
            .collect();

        self.store.replace(path, entries)?;
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
