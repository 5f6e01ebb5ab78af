//! Layered configuration: defaults, then `docqa.toml`, then `DOCQA_*` env vars.
//!
//! Nested keys use `__` in environment variables, e.g.
//! `DOCQA_RETRIEVAL__TOP_K=5` or `DOCQA_EMBEDDING__MODEL=nomic-embed-text`.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{codes, AppError};

pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";
pub const ENV_PREFIX: &str = "DOCQA_";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.
Use the information below to answer the user's question.
If you do not know the answer, say that you do not know. Do not make anything up.
Give a detailed answer grounded in the provided context.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Vectors are unit-normalized on the way in, so inner product ranks by cosine.
    #[default]
    Cosine,
    /// Raw inner product, no normalization.
    Dot,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Dot => "dot",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    #[default]
    Memory,
    Disk,
}

/// What to do when the retrieved evidence does not fit `max_context_length`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    #[default]
    DropLowestScore,
    TruncateTail,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            dimension: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "llama3.1".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            api_key: None,
        }
    }
}

/// Window sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub max_context_length: usize,
    pub budget_policy: BudgetPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.7,
            max_context_length: 6000,
            budget_policy: BudgetPolicy::DropLowestScore,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub metric: DistanceMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub documents_dir: PathBuf,
    pub state_dir: PathBuf,
    pub system_prompt: String,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("documents"),
            state_dir: PathBuf::from("vector_store"),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            index: IndexConfig::default(),
            retry: RetryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (or `docqa.toml` in the working directory when `None`),
    /// overlaid with `DOCQA_*` environment variables, then validate.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, AppError> {
        let config: AppConfig = figment.extract().map_err(|e| {
            AppError::new(codes::INVALID_CONFIGURATION, "Failed to read configuration")
                .with_details(e.to_string())
        })?;
        config.validate()?;
        tracing::debug!(
            state_dir = %config.state_dir.display(),
            backend = ?config.index.backend,
            metric = config.index.metric.as_str(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |message: &str, details: String| {
            Err(AppError::new(codes::INVALID_CONFIGURATION, message).with_details(details))
        };

        if self.chunking.chunk_size == 0 {
            return invalid("chunk_size must be greater than zero", "chunk_size=0".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid(
                "chunk_overlap must be smaller than chunk_size",
                format!(
                    "chunk_size={}; chunk_overlap={}",
                    self.chunking.chunk_size, self.chunking.chunk_overlap
                ),
            );
        }
        if self.retrieval.top_k == 0 {
            return invalid("top_k must be at least 1", "top_k=0".to_string());
        }
        let threshold = self.retrieval.similarity_threshold;
        if !threshold.is_finite()
            || (self.index.metric == DistanceMetric::Cosine && !(-1.0..=1.0).contains(&threshold))
        {
            return invalid(
                "similarity_threshold is out of range for the distance metric",
                format!("similarity_threshold={threshold}; metric={}", self.index.metric.as_str()),
            );
        }
        if self.retrieval.max_context_length == 0 {
            return invalid(
                "max_context_length must be greater than zero",
                "max_context_length=0".to_string(),
            );
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be greater than zero", "dimension=0".to_string());
        }
        if self.embedding.model.trim().is_empty() {
            return invalid("embedding.model is required", String::new());
        }
        if self.generation.model.trim().is_empty() {
            return invalid("generation.model is required", String::new());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1", "max_attempts=0".to_string());
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return invalid(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms",
                format!(
                    "initial_delay_ms={}; max_delay_ms={}",
                    self.retry.initial_delay_ms, self.retry.max_delay_ms
                ),
            );
        }
        if self.state_dir.as_os_str().is_empty() {
            return invalid("state_dir is required", String::new());
        }
        Ok(())
    }
}
