use docqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::http::{call_error, GENERATE_TIMEOUT};
use crate::openai::OpenAiClient;
use crate::prompt::GenerationRequest;

#[derive(Debug, Clone)]
pub struct OpenAiLlm {
    client: OpenAiClient,
}

impl OpenAiLlm {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Llm for OpenAiLlm {
    fn complete(&self, model: &str, request: &GenerationRequest) -> Result<String, AppError> {
        let user = request.user_turn();
        let body = serde_json::to_value(ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.0,
        })
        .map_err(|e| {
            AppError::new(codes::GENERATION_FAILURE, "Failed to encode chat request")
                .with_details(e.to_string())
        })?;

        let (url, req) = self.client.post("/v1/chat/completions", GENERATE_TIMEOUT);
        let resp = req
            .send_json(body)
            .map_err(|e| call_error(codes::GENERATION_FAILURE, "Chat request failed", &url, e))?;
        let parsed: ChatResponse = resp.into_json().map_err(|e| {
            AppError::new(codes::GENERATION_FAILURE, "Failed to decode chat response")
                .with_details(e.to_string())
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::new(
                codes::GENERATION_FAILURE,
                "Chat response was empty",
            ));
        }
        Ok(text)
    }
}
