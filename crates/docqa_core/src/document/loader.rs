use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::{codes, AppError};

/// Text extraction boundary. Per-format parsing (PDF, DOCX, ...) lives behind this trait.
pub trait DocumentLoader: Send + Sync {
    /// Lowercase file extensions this loader can extract, without the dot.
    fn supported_formats(&self) -> BTreeSet<String>;

    fn extract_text(&self, path: &Path) -> Result<String, AppError>;

    fn supports(&self, format: &str) -> bool {
        self.supported_formats().contains(&format.to_ascii_lowercase())
    }
}

const PLAIN_TEXT_FORMATS: &[&str] = &["csv", "json", "log", "markdown", "md", "rst", "txt"];

/// Reads UTF-8 text files, falling back to lossy decoding for stray bytes.
#[derive(Debug, Clone, Default)]
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn supported_formats(&self) -> BTreeSet<String> {
        PLAIN_TEXT_FORMATS.iter().map(|s| s.to_string()).collect()
    }

    fn extract_text(&self, path: &Path) -> Result<String, AppError> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::new(codes::EXTRACTION_FAILURE, "Failed to read document")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::debug!(path = %path.display(), "document is not valid UTF-8; decoding lossily");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_loader_reads_lossy_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"caf\xff ok").unwrap();

        let text = PlainTextLoader.extract_text(&path).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" ok"));
    }

    #[test]
    fn plain_text_loader_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlainTextLoader
            .extract_text(&dir.path().join("missing.txt"))
            .unwrap_err();
        assert_eq!(err.code, codes::EXTRACTION_FAILURE);
    }

    #[test]
    fn format_lookup_is_case_insensitive() {
        assert!(PlainTextLoader.supports("MD"));
        assert!(!PlainTextLoader.supports("pdf"));
    }
}
