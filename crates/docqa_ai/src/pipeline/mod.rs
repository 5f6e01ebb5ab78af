//! Documents directory -> chunks -> embeddings -> index, in full or incremental mode.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use docqa_core::config::AppConfig;
use docqa_core::document::{discover_documents, DocumentFile, DocumentLoader, Fingerprint};
use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::embeddings::Embedder;
use crate::evidence::index::{new_index, prepare_vector, write_index};
use crate::evidence::{
    Chunker, IndexEntry, IndexParams, Manifest, ManifestDocument, SharedIndex, StateStore,
    VectorIndex,
};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RebuildMode {
    Full,
    Incremental,
}

/// A document that could not be indexed. The rest of the batch carries on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentError {
    pub document_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    /// Documents (re-)chunked and embedded in this run.
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub documents_removed: usize,
    pub chunks_created: usize,
    pub chunks_removed: usize,
    pub embeddings_computed: usize,
    pub errors: Vec<DocumentError>,
    /// Generation committed by this run; `None` when nothing changed.
    pub generation: Option<String>,
    /// Mode actually used; incremental escalates to full on an incompatible manifest.
    pub mode: Option<RebuildMode>,
    pub duration_ms: u64,
}

/// A document whose new entries are ready to go into the index.
struct Prepared {
    document_id: String,
    entries: Vec<IndexEntry>,
    record: ManifestDocument,
}

pub struct IndexingPipeline {
    embedder: Arc<dyn Embedder>,
    loader: Arc<dyn DocumentLoader>,
    chunker: Chunker,
    store: StateStore,
    index: SharedIndex,
    params: IndexParams,
    retry: RetryPolicy,
    rebuild_lock: Mutex<()>,
}

impl IndexingPipeline {
    pub fn new(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        loader: Arc<dyn DocumentLoader>,
        index: SharedIndex,
    ) -> Result<Self, AppError> {
        Ok(Self {
            embedder,
            loader,
            chunker: Chunker::from_config(&config.chunking)?,
            store: StateStore::open(config.state_dir.clone()),
            index,
            params: IndexParams::from_config(config),
            retry: RetryPolicy::from_config(&config.retry),
            rebuild_lock: Mutex::new(()),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Index everything under `documents_dir` and persist the result.
    ///
    /// Only a missing documents directory, corrupt prior state or a failure to
    /// persist aborts; per-document problems land in `IndexStats::errors`.
    pub fn rebuild(&self, documents_dir: &Path, mode: RebuildMode) -> Result<IndexStats, AppError> {
        let _serial = self.serialize()?;
        let started = Instant::now();

        let files = discover_documents(documents_dir)?;
        let (mode, previous) = self.resolve_mode(mode)?;
        tracing::info!(
            dir = %documents_dir.display(),
            files = files.len(),
            mode = ?mode,
            "rebuild started"
        );

        let mut stats = IndexStats {
            mode: Some(mode),
            ..IndexStats::default()
        };
        let mut manifest = Manifest::new(self.params.clone(), now_rfc3339_utc());
        let mut prepared: Vec<Prepared> = Vec::new();
        let mut stale_ids: Vec<String> = Vec::new();
        let mut dirty = mode == RebuildMode::Full;

        // Embedding happens here, without touching the shared index.
        for file in files.iter() {
            let prior = previous.get(&file.id);
            if let Some(prior) = prior {
                if prior.fingerprint.matches_stat(file) {
                    stats.documents_skipped += 1;
                    manifest.documents.insert(file.id.clone(), prior.clone());
                    continue;
                }
            }

            match self.prepare_document(file, prior, &mut stats) {
                Ok(Some(p)) => {
                    if let Some(prior) = prior {
                        stale_ids.extend(prior.chunk_ids.iter().cloned());
                    }
                    stats.documents_processed += 1;
                    stats.chunks_created += p.entries.len();
                    manifest.documents.insert(p.document_id.clone(), p.record.clone());
                    prepared.push(p);
                    dirty = true;
                }
                Ok(None) => {
                    // Content unchanged; only the stat data moved.
                    stats.documents_skipped += 1;
                    if let Some(prior) = prior {
                        let mut record = prior.clone();
                        record.fingerprint.mtime_ms = file.meta.mtime_ms;
                        record.fingerprint.len = file.len;
                        manifest.documents.insert(file.id.clone(), record);
                        dirty = true;
                    }
                }
                Err(e) => {
                    tracing::warn!(document_id = %file.id, err = %e, "document skipped");
                    stats.errors.push(DocumentError {
                        document_id: file.id.clone(),
                        code: e.code.clone(),
                        message: e.message.clone(),
                    });
                    // Keep what was indexed before so a later run can retry.
                    if let Some(prior) = prior {
                        manifest.documents.insert(file.id.clone(), prior.clone());
                    }
                }
            }
        }

        let present = files.iter().map(|f| f.id.as_str()).collect::<HashSet<_>>();
        for (id, prior) in previous.iter() {
            if !present.contains(id.as_str()) {
                tracing::info!(document_id = %id, chunks = prior.chunk_ids.len(), "document removed");
                stats.documents_removed += 1;
                stale_ids.extend(prior.chunk_ids.iter().cloned());
                dirty = true;
            }
        }

        if dirty {
            let generation = self.apply(mode, prepared, &stale_ids, &manifest, &mut stats)?;
            stats.generation = Some(generation);
        }

        stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            processed = stats.documents_processed,
            skipped = stats.documents_skipped,
            removed = stats.documents_removed,
            chunks = stats.chunks_created,
            embeddings = stats.embeddings_computed,
            errors = stats.errors.len(),
            duration_ms = stats.duration_ms,
            "rebuild finished"
        );
        Ok(stats)
    }

    /// Replace the shared index with the committed generation and return its
    /// name. Waits for any running rebuild so an older generation is never
    /// swapped in over a newer one.
    pub fn reload(&self) -> Result<Option<String>, AppError> {
        let _serial = self.serialize()?;
        let mut fresh = new_index(self.params.backend, self.params.metric, self.params.dimension);
        let generation = self.store.load_index(&mut *fresh)?;
        let entries = fresh.size();
        write_index(&self.index)?.install(fresh, generation.clone());
        tracing::info!(generation = ?generation, entries, "index reloaded");
        Ok(generation)
    }

    fn serialize(&self) -> Result<MutexGuard<'_, ()>, AppError> {
        self.rebuild_lock.lock().map_err(|_| {
            AppError::new(codes::INDEX_LOCK_POISONED, "Rebuild lock poisoned by a panicked rebuild")
        })
    }

    /// Incremental needs a manifest built with the same parameters; otherwise it
    /// becomes a full rebuild.
    fn resolve_mode(
        &self,
        requested: RebuildMode,
    ) -> Result<(RebuildMode, BTreeMap<String, ManifestDocument>), AppError> {
        if requested == RebuildMode::Full {
            return Ok((RebuildMode::Full, BTreeMap::new()));
        }
        let Some(generation) = self.store.current_generation()? else {
            return Ok((RebuildMode::Full, BTreeMap::new()));
        };
        let manifest = self.store.read_generation_manifest(&generation)?;
        if !manifest.is_compatible(&self.params) {
            tracing::info!(
                stored_model = %manifest.params.embedding_model,
                model = %self.params.embedding_model,
                "stored index parameters differ; running a full rebuild"
            );
            return Ok((RebuildMode::Full, BTreeMap::new()));
        }
        self.sync_with_disk(&generation)?;
        Ok((RebuildMode::Incremental, manifest.documents))
    }

    /// Incremental updates patch the in-memory index, so it has to hold exactly
    /// the generation whose manifest drives the update.
    fn sync_with_disk(&self, generation: &str) -> Result<(), AppError> {
        let mut guard = write_index(&self.index)?;
        if guard.generation.as_deref() == Some(generation) {
            return Ok(());
        }
        let mut loaded = new_index(self.params.backend, self.params.metric, self.params.dimension);
        self.store.load_generation(&mut *loaded, generation)?;
        tracing::debug!(
            held = ?guard.generation,
            generation,
            entries = loaded.size(),
            "in-memory index reloaded before incremental rebuild"
        );
        guard.install(loaded, Some(generation.to_string()));
        Ok(())
    }

    /// `Ok(None)` when the content hash matches `prior`.
    fn prepare_document(
        &self,
        file: &DocumentFile,
        prior: Option<&ManifestDocument>,
        stats: &mut IndexStats,
    ) -> Result<Option<Prepared>, AppError> {
        if !self.loader.supports(&file.meta.format) {
            return Err(AppError::new(codes::EXTRACTION_FAILURE, "Unsupported document format")
                .with_details(format!("format={:?}", file.meta.format)));
        }
        let raw_text = self.loader.extract_text(&file.path)?;
        let fingerprint = Fingerprint::compute(file, &raw_text);
        if prior.is_some_and(|p| p.fingerprint.sha256 == fingerprint.sha256) {
            return Ok(None);
        }
        if raw_text.trim().is_empty() {
            return Err(AppError::new(codes::EXTRACTION_FAILURE, "Document has no text"));
        }

        let format = file.meta.format.clone();
        let document = file.clone().into_document(raw_text);
        let chunks = self.chunker.chunk(&document);
        let texts = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>();

        let vectors = self
            .retry
            .run("embed_document", || self.embedder.embed_batch(&self.params.embedding_model, &texts))?;
        stats.embeddings_computed += vectors.len();
        if vectors.len() != chunks.len() {
            return Err(AppError::new(
                codes::EMBEDDING_FAILURE,
                "Embedder returned the wrong number of vectors",
            )
            .with_details(format!("expected={}; got={}", chunks.len(), vectors.len())));
        }
        // Reject bad vectors now so the locked section below cannot fail on them.
        for v in &vectors {
            prepare_vector(v.clone(), self.params.dimension, self.params.metric)?;
        }

        tracing::debug!(document_id = %document.id, chunks = chunks.len(), "document embedded");
        let chunk_ids = chunks.iter().map(|c| c.id.clone()).collect();
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, v)| IndexEntry::new(chunk, v))
            .collect();
        Ok(Some(Prepared {
            document_id: document.id,
            entries,
            record: ManifestDocument {
                fingerprint,
                format,
                chunk_ids,
            },
        }))
    }

    /// Mutate the shared index and persist, under the write lock.
    fn apply(
        &self,
        mode: RebuildMode,
        prepared: Vec<Prepared>,
        stale_ids: &[String],
        manifest: &Manifest,
        stats: &mut IndexStats,
    ) -> Result<String, AppError> {
        let mut guard = write_index(&self.index)?;
        if mode == RebuildMode::Full {
            stats.chunks_removed = guard.size();
            guard.clear();
        } else {
            // Another writer on the same state directory committed since the
            // manifest was read; patching would mix two generations.
            let on_disk = self.store.current_generation()?;
            if on_disk != guard.generation {
                return Err(AppError::new(
                    codes::STATE_IO_FAILURE,
                    "Index state changed during the rebuild; run it again",
                )
                .with_details(format!("held={:?}; current={:?}", guard.generation, on_disk)));
            }
            stats.chunks_removed = guard.remove(stale_ids);
        }

        let committed = prepared
            .into_iter()
            .try_for_each(|p| guard.add(p.entries))
            .and_then(|()| self.store.commit(&**guard, manifest));

        match committed {
            Ok(generation) => {
                guard.generation = Some(generation.clone());
                Ok(generation)
            }
            Err(e) => {
                // Put the in-memory index back in line with what is on disk.
                let mut restored = new_index(self.params.backend, self.params.metric, self.params.dimension);
                match self.store.load_index(&mut *restored) {
                    Ok(generation) => guard.install(restored, generation),
                    Err(reload_err) => {
                        tracing::error!(err = %reload_err, "failed to restore index after a failed commit");
                        guard.clear();
                        guard.generation = None;
                    }
                }
                Err(e)
            }
        }
    }
}

fn now_rfc3339_utc() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
