//! Query-time facade: retrieve, assemble, generate. Also owns the shared index
//! so rebuilds and reloads never interleave with a search.

use std::path::Path;
use std::sync::{Arc, RwLock};

use docqa_core::config::{AppConfig, DistanceMetric, IndexBackend};
use docqa_core::document::{DocumentLoader, PlainTextLoader};
use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::evidence::index::{new_index, read_index};
use crate::evidence::{share_generation, IndexParams, SharedIndex, StateStore, VectorIndex};
use crate::llm::Llm;
use crate::pipeline::{IndexStats, IndexingPipeline, RebuildMode};
use crate::prompt::PromptAssembler;
use crate::providers::{build_embedder, build_llm};
use crate::retrieve::Retriever;
use crate::retry::RetryPolicy;

/// External capabilities the engine is composed from.
#[derive(Clone)]
pub struct EngineDeps {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn Llm>,
    pub loader: Arc<dyn DocumentLoader>,
}

impl EngineDeps {
    /// Network providers from config, plain-text extraction.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            embedder: build_embedder(&config.embedding)?,
            llm: build_llm(&config.generation)?,
            loader: Arc::new(PlainTextLoader),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub document_id: String,
    pub position: u32,
    pub chunk_text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Evidence that went into the prompt, best first. Empty when nothing matched.
    pub sources: Vec<AnswerSource>,
}

/// Per-call overrides; `None` falls back to the engine's configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub text: String,
    pub system_prompt: Option<String>,
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub entries: usize,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub backend: IndexBackend,
    pub generation: Option<String>,
    pub documents: usize,
    pub embedding_model: String,
    pub updated_at: Option<String>,
}

pub struct QueryEngine {
    config: AppConfig,
    index: SharedIndex,
    store: StateStore,
    retriever: Retriever,
    assembler: PromptAssembler,
    pipeline: IndexingPipeline,
    llm: Arc<dyn Llm>,
    retry: RetryPolicy,
    system_prompt: RwLock<String>,
}

impl QueryEngine {
    /// Validate `config` and load the persisted index, if any.
    ///
    /// No state yet means an empty index; unreadable state is `CORRUPT_INDEX`.
    /// Use [`QueryEngine::ensure_index`] to build one on first use.
    pub fn open(config: &AppConfig, deps: EngineDeps) -> Result<Self, AppError> {
        config.validate()?;

        let store = StateStore::open(config.state_dir.clone());
        let (loaded, generation) = load_current(config, &store)?;
        match &generation {
            Some(generation) => {
                let manifest = store.read_generation_manifest(generation)?;
                if !manifest.is_compatible(&IndexParams::from_config(config)) {
                    tracing::warn!(
                        stored_model = %manifest.params.embedding_model,
                        model = %config.embedding.model,
                        "persisted index was built with different parameters; run a full rebuild"
                    );
                }
            }
            None => tracing::warn!(
                state_dir = %config.state_dir.display(),
                "no index has been built yet; answers will have no context until `docqa index` runs"
            ),
        }
        let index = share_generation(loaded, generation);

        let retry = RetryPolicy::from_config(&config.retry);
        let retriever = Retriever::new(index.clone(), deps.embedder.clone(), config.embedding.model.clone())
            .with_retry(retry.clone());
        let pipeline = IndexingPipeline::new(config, deps.embedder, deps.loader, index.clone())?
            .with_retry(retry.clone());

        Ok(Self {
            config: config.clone(),
            index,
            store,
            retriever,
            assembler: PromptAssembler::from_config(&config.retrieval),
            pipeline,
            llm: deps.llm,
            retry,
            system_prompt: RwLock::new(config.system_prompt.clone()),
        })
    }

    /// Replace the retry policy for every external call the engine makes.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retriever = self.retriever.with_retry(retry.clone());
        self.pipeline = self.pipeline.with_retry(retry.clone());
        self.retry = retry;
        self
    }

    pub fn documents_dir(&self) -> &Path {
        &self.config.documents_dir
    }

    pub fn answer(&self, query_text: &str, system_prompt: Option<&str>) -> Result<Answer, AppError> {
        self.answer_with(&Query {
            system_prompt: system_prompt.map(str::to_string),
            ..Query::new(query_text)
        })
    }

    pub fn answer_with(&self, query: &Query) -> Result<Answer, AppError> {
        let top_k = query.top_k.unwrap_or(self.config.retrieval.top_k);
        let threshold = query
            .similarity_threshold
            .unwrap_or(self.config.retrieval.similarity_threshold);
        let evidence = self.retriever.retrieve(&query.text, top_k, threshold)?;

        let system_prompt = match &query.system_prompt {
            Some(p) => p.clone(),
            None => self.system_prompt(),
        };
        let assembled = self.assembler.assemble(&system_prompt, &evidence, query.text.trim());
        if evidence.is_empty() {
            tracing::info!(threshold, "no evidence above threshold; answering without context");
        }

        let model = &self.config.generation.model;
        let text = self
            .retry
            .run("generate", || self.llm.complete(model, &assembled.request))?;

        let sources = evidence
            .into_iter()
            .take(assembled.included)
            .map(|e| AnswerSource {
                document_id: e.chunk.document_id,
                position: e.chunk.position,
                chunk_text: e.chunk.text,
                score: e.score,
            })
            .collect::<Vec<_>>();
        tracing::info!(sources = sources.len(), answer_chars = text.chars().count(), "answered");
        Ok(Answer { text, sources })
    }

    /// Re-read the persisted index and swap it in. In-flight searches finish on
    /// the old one. Returns the generation now being served.
    pub fn reload(&self) -> Result<Option<String>, AppError> {
        self.pipeline.reload()
    }

    pub fn rebuild(&self, documents_dir: &Path, mode: RebuildMode) -> Result<IndexStats, AppError> {
        self.pipeline.rebuild(documents_dir, mode)
    }

    /// Build the index from the configured documents directory when nothing
    /// has been committed yet. `None` when an index already exists.
    pub fn ensure_index(&self) -> Result<Option<IndexStats>, AppError> {
        if self.store.current_generation()?.is_some() {
            return Ok(None);
        }
        tracing::info!(dir = %self.config.documents_dir.display(), "no index yet; building one");
        self.rebuild(&self.config.documents_dir, RebuildMode::Full).map(Some)
    }

    pub fn set_system_prompt(&self, prompt: &str) -> Result<(), AppError> {
        if prompt.trim().is_empty() {
            return Err(AppError::new(codes::INVALID_CONFIGURATION, "System prompt must not be empty"));
        }
        let mut guard = self.system_prompt.write().unwrap_or_else(|e| e.into_inner());
        *guard = prompt.to_string();
        tracing::info!(chars = prompt.chars().count(), "system prompt updated");
        Ok(())
    }

    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> Result<IndexStatus, AppError> {
        let manifest = self.store.read_manifest()?;
        let guard = read_index(&self.index)?;
        Ok(IndexStatus {
            entries: guard.size(),
            dimension: guard.dimension(),
            metric: guard.metric(),
            backend: guard.backend(),
            generation: self.store.current_generation()?,
            documents: manifest.as_ref().map(|m| m.documents.len()).unwrap_or(0),
            embedding_model: manifest
                .as_ref()
                .map(|m| m.params.embedding_model.clone())
                .unwrap_or_else(|| self.config.embedding.model.clone()),
            updated_at: manifest.map(|m| m.updated_at),
        })
    }
}

fn load_current(
    config: &AppConfig,
    store: &StateStore,
) -> Result<(Box<dyn VectorIndex>, Option<String>), AppError> {
    let mut index = new_index(config.index.backend, config.index.metric, config.embedding.dimension);
    let generation = store.load_index(&mut *index)?;
    Ok((index, generation))
}
