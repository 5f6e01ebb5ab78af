use docqa_core::error::AppError;

use crate::prompt::GenerationRequest;

/// Text generation boundary.
pub trait Llm: Send + Sync {
    fn complete(&self, model: &str, request: &GenerationRequest) -> Result<String, AppError>;
}

pub mod ollama_llm;
pub mod openai_llm;
