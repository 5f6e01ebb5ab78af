//! Persisted index state under `state_dir`.
//!
//! ```text
//! CURRENT              name of the live generation
//! gen-000007/index.json
//! gen-000007/index.<sha>.bin (disk backend only)
//! gen-000007/manifest.json
//! ```
//!
//! A commit writes a complete new generation, then swaps `CURRENT`. Anything
//! not named by `CURRENT` is garbage and gets pruned.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use docqa_core::config::{AppConfig, DistanceMetric, IndexBackend};
use docqa_core::document::Fingerprint;
use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::fsutil::{corrupt, read_state_file, write_atomic};
use super::index::VectorIndex;

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

const CURRENT_FILE: &str = "CURRENT";
const INDEX_FILE: &str = "index.json";
const MANIFEST_FILE: &str = "manifest.json";
const GEN_PREFIX: &str = "gen-";

/// Everything that must match for stored vectors to be reusable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexParams {
    pub embedding_model: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub backend: IndexBackend,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IndexParams {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            embedding_model: config.embedding.model.clone(),
            dimension: config.embedding.dimension,
            metric: config.index.metric,
            backend: config.index.backend,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestDocument {
    pub fingerprint: Fingerprint,
    pub format: String,
    /// In position order.
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub format_version: u32,
    pub params: IndexParams,
    pub updated_at: String,
    pub documents: BTreeMap<String, ManifestDocument>,
}

impl Manifest {
    pub fn new(params: IndexParams, updated_at: String) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            params,
            updated_at,
            documents: BTreeMap::new(),
        }
    }

    pub fn is_compatible(&self, params: &IndexParams) -> bool {
        self.params == *params
    }

    pub fn chunk_count(&self) -> usize {
        self.documents.values().map(|d| d.chunk_ids.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn current_path(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(generation)
    }

    /// The live generation, or `None` when nothing has been committed yet.
    pub fn current_generation(&self) -> Result<Option<String>, AppError> {
        let path = self.current_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::new(codes::STATE_IO_FAILURE, "Failed to read CURRENT pointer")
                    .with_details(format!("path={}; err={}", path.display(), e)))
            }
        };
        let name = raw.trim();
        if parse_generation(name).is_none() {
            return Err(corrupt("CURRENT does not name a generation", &path, format!("content={name:?}")));
        }
        let dir = self.generation_dir(name);
        if !dir.is_dir() {
            return Err(corrupt(
                "CURRENT points at a missing generation",
                &path,
                format!("generation={name}"),
            ));
        }
        Ok(Some(name.to_string()))
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>, AppError> {
        match self.current_generation()? {
            Some(generation) => self.read_generation_manifest(&generation).map(Some),
            None => Ok(None),
        }
    }

    /// The manifest stored in `generation`, live or not.
    pub fn read_generation_manifest(&self, generation: &str) -> Result<Manifest, AppError> {
        let path = self.generation_dir(generation).join(MANIFEST_FILE);
        let bytes = read_state_file(&path)?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| corrupt("Failed to decode manifest", &path, e))?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(corrupt(
                "Unsupported manifest format version",
                &path,
                format!("expected={MANIFEST_FORMAT_VERSION}; got={}", manifest.format_version),
            ));
        }
        Ok(manifest)
    }

    /// Load the live generation into `index`. Returns the generation name, or
    /// `None` (leaving `index` untouched) when nothing has been committed.
    pub fn load_index(&self, index: &mut dyn VectorIndex) -> Result<Option<String>, AppError> {
        let Some(generation) = self.current_generation()? else {
            return Ok(None);
        };
        self.load_generation(index, &generation)?;
        Ok(Some(generation))
    }

    pub fn load_generation(&self, index: &mut dyn VectorIndex, generation: &str) -> Result<(), AppError> {
        index.load(&self.generation_dir(generation).join(INDEX_FILE))?;
        tracing::info!(generation = %generation, entries = index.size(), "index loaded");
        Ok(())
    }

    /// Persist `index` and `manifest` as a new generation and make it live.
    pub fn commit(&self, index: &dyn VectorIndex, manifest: &Manifest) -> Result<String, AppError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            AppError::new(codes::STATE_IO_FAILURE, "Failed to create state directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })?;

        let generation = format!("{GEN_PREFIX}{:06}", self.next_generation_number()?);
        let dir = self.generation_dir(&generation);
        fs::create_dir(&dir).map_err(|e| {
            AppError::new(codes::STATE_IO_FAILURE, "Failed to create generation directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;

        let manifest_json = serde_json::to_vec_pretty(manifest).map_err(|e| {
            AppError::new(codes::STATE_IO_FAILURE, "Failed to encode manifest").with_details(e.to_string())
        })?;
        index.save(&dir.join(INDEX_FILE))?;
        write_atomic(&dir.join(MANIFEST_FILE), &manifest_json)?;

        // The swap: until this rename lands, readers still see the previous generation.
        write_atomic(&self.current_path(), generation.as_bytes())?;
        tracing::info!(
            generation = %generation,
            entries = index.size(),
            documents = manifest.documents.len(),
            "state committed"
        );

        self.prune(&generation);
        Ok(generation)
    }

    fn list_entries(&self) -> Result<Vec<(String, PathBuf)>, AppError> {
        let rd = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::new(codes::STATE_IO_FAILURE, "Failed to list state directory")
                    .with_details(format!("path={}; err={}", self.root.display(), e)))
            }
        };
        let mut out = Vec::new();
        for entry in rd.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                out.push((name.to_string(), entry.path()));
            }
        }
        Ok(out)
    }

    // Leftovers from an interrupted commit count too, so their names are never reused.
    fn next_generation_number(&self) -> Result<u64, AppError> {
        let max = self
            .list_entries()?
            .iter()
            .filter_map(|(name, _)| parse_generation(name))
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Best effort; a failed prune only leaves garbage behind.
    fn prune(&self, keep: &str) {
        let Ok(entries) = self.list_entries() else {
            return;
        };
        for (name, path) in entries {
            let result = if name != keep && parse_generation(&name).is_some() {
                fs::remove_dir_all(&path)
            } else if name.ends_with(".tmp") && path.is_file() {
                fs::remove_file(&path)
            } else {
                continue;
            };
            match result {
                Ok(()) => tracing::debug!(entry = %name, "pruned stale state"),
                Err(e) => tracing::warn!(entry = %name, err = %e, "failed to prune stale state"),
            }
        }
    }
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GEN_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::evidence::index::new_index;
    use crate::evidence::model::{EntryMeta, IndexEntry};

    fn params() -> IndexParams {
        IndexParams::from_config(&AppConfig::default())
    }

    fn small_params() -> IndexParams {
        IndexParams {
            dimension: 2,
            ..params()
        }
    }

    fn index_with(ids: &[&str]) -> Box<dyn VectorIndex> {
        let mut index = new_index(IndexBackend::Memory, DistanceMetric::Cosine, 2);
        index
            .add(
                ids.iter()
                    .map(|id| IndexEntry {
                        chunk_id: id.to_string(),
                        embedding: vec![1.0, 0.0],
                        meta: EntryMeta {
                            document_id: "a.txt".to_string(),
                            position: 0,
                            text: "alpha".to_string(),
                        },
                    })
                    .collect(),
            )
            .unwrap();
        index
    }

    #[test]
    fn empty_state_has_no_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("missing"));
        assert_eq!(store.current_generation().unwrap(), None);
        assert_eq!(store.read_manifest().unwrap(), None);

        let mut index = new_index(IndexBackend::Memory, DistanceMetric::Cosine, 2);
        assert_eq!(store.load_index(&mut *index).unwrap(), None);
    }

    #[test]
    fn commit_swaps_generation_and_prunes_old_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().to_path_buf());
        let manifest = Manifest::new(small_params(), "2026-01-01T00:00:00Z".to_string());

        let first = store.commit(&*index_with(&["a"]), &manifest).unwrap();
        let second = store.commit(&*index_with(&["a", "b"]), &manifest).unwrap();
        assert_eq!(first, "gen-000001");
        assert_eq!(second, "gen-000002");
        assert!(!dir.path().join(&first).exists());

        let mut loaded = new_index(IndexBackend::Memory, DistanceMetric::Cosine, 2);
        assert_eq!(store.load_index(&mut *loaded).unwrap(), Some(second));
        assert_eq!(loaded.size(), 2);
        assert_eq!(store.read_manifest().unwrap(), Some(manifest));
    }

    #[test]
    fn dangling_current_pointer_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "gen-000004").unwrap();
        let store = StateStore::open(dir.path().to_path_buf());
        let err = store.current_generation().unwrap_err();
        assert_eq!(err.code, codes::CORRUPT_INDEX);

        fs::write(dir.path().join(CURRENT_FILE), "not a generation").unwrap();
        assert_eq!(store.current_generation().unwrap_err().code, codes::CORRUPT_INDEX);
    }

    #[test]
    fn compatibility_covers_model_and_chunking() {
        let manifest = Manifest::new(params(), String::new());
        assert!(manifest.is_compatible(&params()));

        let mut other = params();
        other.embedding_model = "other-model".to_string();
        assert!(!manifest.is_compatible(&other));

        let mut other = params();
        other.chunk_overlap += 1;
        assert!(!manifest.is_compatible(&other));
    }
}
