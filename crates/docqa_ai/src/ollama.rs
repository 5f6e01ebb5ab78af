use docqa_core::error::{codes, AppError};

use crate::http::normalize_base_url;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Create a client for a local Ollama server. Only `127.0.0.1` is accepted.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let not_allowed = || {
            AppError::new(
                codes::PROVIDER_NOT_ALLOWED,
                "Ollama base URL must be http://127.0.0.1[:port]",
            )
            .with_details(format!("base_url={base_url}"))
        };
        let base_url = normalize_base_url(base_url).ok_or_else(not_allowed)?;

        if !base_url.starts_with("http://127.0.0.1:") && base_url != "http://127.0.0.1" {
            return Err(not_allowed());
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url)
            .timeout(std::time::Duration::from_millis(800))
            .call();

        match resp {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, _)) => Err(AppError::new(
                codes::PROVIDER_UNREACHABLE,
                "Ollama health check failed",
            )
            .with_details(format!("status={status}"))),
            Err(e) => Err(AppError::new(
                codes::PROVIDER_UNREACHABLE,
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(e.to_string())
            .with_retryable(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_loopback_only_base_url() {
        assert!(OllamaClient::new("http://127.0.0.1:11434").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1").is_ok());
        assert_eq!(
            OllamaClient::new("http://127.0.0.1:11434/").unwrap().base_url(),
            "http://127.0.0.1:11434"
        );

        assert!(OllamaClient::new("http://localhost:11434").is_err());
        assert!(OllamaClient::new("http://0.0.0.0:11434").is_err());
        assert!(OllamaClient::new("https://example.com").is_err());
        assert!(OllamaClient::new("http://127.0.0.1.evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1@evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:11434/api").is_err());
    }
}
