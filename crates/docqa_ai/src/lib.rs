pub mod embeddings;
pub mod engine;
pub mod evidence;
mod http;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod retrieve;
pub mod retry;

pub use engine::{Answer, AnswerSource, EngineDeps, IndexStatus, Query, QueryEngine};
pub use pipeline::{DocumentError, IndexStats, IndexingPipeline, RebuildMode};
