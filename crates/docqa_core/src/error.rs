use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by every layer.
pub mod codes {
    /// Bad chunking, retrieval or provider parameters. Fatal at construction.
    pub const INVALID_CONFIGURATION: &str = "INVALID_CONFIGURATION";
    /// A single document could not be read or parsed.
    pub const EXTRACTION_FAILURE: &str = "EXTRACTION_FAILURE";
    pub const EMBEDDING_FAILURE: &str = "EMBEDDING_FAILURE";
    pub const GENERATION_FAILURE: &str = "GENERATION_FAILURE";
    /// Persisted state is unreadable or was written by an incompatible version.
    /// Requires a full rebuild.
    pub const CORRUPT_INDEX: &str = "CORRUPT_INDEX";
    pub const INVALID_QUERY: &str = "INVALID_QUERY";
    pub const STATE_IO_FAILURE: &str = "STATE_IO_FAILURE";
    pub const INDEX_LOCK_POISONED: &str = "INDEX_LOCK_POISONED";
    pub const PROVIDER_NOT_ALLOWED: &str = "PROVIDER_NOT_ALLOWED";
    pub const PROVIDER_UNREACHABLE: &str = "PROVIDER_UNREACHABLE";
}

/// Single structured error shape used across the indexing and query layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = self.details.as_deref() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
