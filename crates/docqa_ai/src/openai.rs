use docqa_core::error::{codes, AppError};

use crate::http::{host_of, normalize_base_url};

/// Client settings for an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAiClient {
    /// Plain `http` is only accepted for loopback hosts; the API key travels in a header.
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, AppError> {
        let base_url = normalize_base_url(base_url).ok_or_else(|| {
            AppError::new(codes::INVALID_CONFIGURATION, "Invalid OpenAI base URL")
                .with_details(format!("base_url={base_url}"))
        })?;
        if base_url.starts_with("http://") && !matches!(host_of(&base_url), "127.0.0.1" | "localhost") {
            return Err(AppError::new(
                codes::PROVIDER_NOT_ALLOWED,
                "Remote OpenAI endpoints must use https",
            )
            .with_details(format!("base_url={base_url}")));
        }
        let api_key = api_key.map(str::trim).unwrap_or_default();
        if api_key.is_empty() {
            return Err(AppError::new(
                codes::INVALID_CONFIGURATION,
                "An API key is required for the openai provider",
            ));
        }
        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn post(&self, path: &str, timeout: std::time::Duration) -> (String, ureq::Request) {
        let url = format!("{}{}", self.base_url, path);
        let req = ureq::post(&url)
            .timeout(timeout)
            .set("Authorization", &format!("Bearer {}", self.api_key));
        (url, req)
    }
}
