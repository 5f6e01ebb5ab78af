use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::ollama_embed::clamp_to_char_boundary;
use super::Embedder;
use crate::http::{call_error, EMBED_TIMEOUT};
use crate::openai::OpenAiClient;

const MAX_INPUT_BYTES: usize = 24_000;
/// Inputs per request to `/v1/embeddings`.
const MAX_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn request(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        let (url, req) = self.client.post("/v1/embeddings", EMBED_TIMEOUT);
        let body = serde_json::to_value(EmbeddingsRequest { model, input: inputs }).map_err(|e| {
            AppError::new(codes::EMBEDDING_FAILURE, "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;
        let resp = req.send_json(body).map_err(|e| {
            call_error(codes::EMBEDDING_FAILURE, "Embeddings request failed", &url, e)
        })?;
        let mut parsed: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new(codes::EMBEDDING_FAILURE, "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;

        if parsed.data.len() != inputs.len() {
            return Err(AppError::new(
                codes::EMBEDDING_FAILURE,
                "Embeddings response count does not match request",
            )
            .with_details(format!("sent={}; got={}", inputs.len(), parsed.data.len())));
        }
        // The API documents `index`; do not rely on response order.
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let input = clamp_to_char_boundary(input, MAX_INPUT_BYTES);
        self.request(model, &[input])?
            .pop()
            .ok_or_else(|| AppError::new(codes::EMBEDDING_FAILURE, "Embeddings response was empty"))
    }

    fn embed_batch(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(MAX_BATCH) {
            let refs = batch
                .iter()
                .map(|s| clamp_to_char_boundary(s, MAX_INPUT_BYTES))
                .collect::<Vec<_>>();
            out.extend(self.request(model, &refs)?);
        }
        Ok(out)
    }
}
