//! Turn provider settings into trait objects.

use std::sync::Arc;

use docqa_core::config::{EmbeddingConfig, GenerationConfig, ProviderKind};
use docqa_core::error::AppError;

use crate::embeddings::ollama_embed::OllamaEmbedder;
use crate::embeddings::openai_embed::OpenAiEmbedder;
use crate::embeddings::Embedder;
use crate::llm::ollama_llm::OllamaLlm;
use crate::llm::openai_llm::OpenAiLlm;
use crate::llm::Llm;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

pub fn build_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, AppError> {
    let embedder: Arc<dyn Embedder> = match cfg.provider {
        ProviderKind::Ollama => Arc::new(OllamaEmbedder::new(OllamaClient::new(&cfg.base_url)?)),
        ProviderKind::OpenAi => Arc::new(OpenAiEmbedder::new(OpenAiClient::new(
            &cfg.base_url,
            cfg.api_key.as_deref(),
        )?)),
    };
    tracing::debug!(provider = ?cfg.provider, model = %cfg.model, "embedder ready");
    Ok(embedder)
}

pub fn build_llm(cfg: &GenerationConfig) -> Result<Arc<dyn Llm>, AppError> {
    let llm: Arc<dyn Llm> = match cfg.provider {
        ProviderKind::Ollama => Arc::new(OllamaLlm::new(OllamaClient::new(&cfg.base_url)?)),
        ProviderKind::OpenAi => Arc::new(OpenAiLlm::new(OpenAiClient::new(
            &cfg.base_url,
            cfg.api_key.as_deref(),
        )?)),
    };
    tracing::debug!(provider = ?cfg.provider, model = %cfg.model, "llm ready");
    Ok(llm)
}
