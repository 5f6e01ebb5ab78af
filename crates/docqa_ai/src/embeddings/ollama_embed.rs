use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::http::{call_error, EMBED_TIMEOUT};
use crate::ollama::OllamaClient;

/// Upper bound on a single embedding input, in bytes.
const MAX_INPUT_BYTES: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = clamp_to_char_boundary(input, MAX_INPUT_BYTES);

        let url = format!("{}/api/embeddings", self.client.base_url());
        let req = EmbeddingsRequest { model, prompt };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(codes::EMBEDDING_FAILURE, "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .timeout(EMBED_TIMEOUT)
            .send_json(body)
            .map_err(|e| {
                call_error(codes::EMBEDDING_FAILURE, "Embeddings request failed", &url, e)
            })?;

        let v: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new(codes::EMBEDDING_FAILURE, "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        if v.embedding.is_empty() {
            return Err(AppError::new(
                codes::EMBEDDING_FAILURE,
                "Embeddings response was empty",
            ));
        }
        Ok(v.embedding)
    }
}

pub(crate) fn clamp_to_char_boundary(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}
