use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::http::{call_error, GENERATE_TIMEOUT};
use crate::ollama::OllamaClient;
use crate::prompt::GenerationRequest;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn complete(&self, model: &str, request: &GenerationRequest) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let prompt = request.user_turn();
        let req = GenerateRequest {
            model,
            system: &request.system_prompt,
            prompt: &prompt,
            stream: false,
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(codes::GENERATION_FAILURE, "Failed to encode generate request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .timeout(GENERATE_TIMEOUT)
            .send_json(body)
            .map_err(|e| call_error(codes::GENERATION_FAILURE, "Generate request failed", &url, e))?;

        let v: GenerateResponse = resp.into_json().map_err(|e| {
            AppError::new(codes::GENERATION_FAILURE, "Failed to decode generate response")
                .with_details(e.to_string())
        })?;
        if v.response.trim().is_empty() {
            return Err(AppError::new(
                codes::GENERATION_FAILURE,
                "Generate response was empty",
            ));
        }
        Ok(v.response)
    }
}
