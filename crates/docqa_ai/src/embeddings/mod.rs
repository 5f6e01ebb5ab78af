use docqa_core::error::AppError;

/// Embedding model boundary. Implementations own their transport; the model name
/// is passed per call so the index can record which model produced its vectors.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;

    /// Embed several inputs, preserving order. Providers with a native batch
    /// endpoint override this.
    fn embed_batch(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        inputs.iter().map(|input| self.embed(model, input)).collect()
    }
}

pub mod ollama_embed;
pub mod openai_embed;
