use docqa_core::config::ChunkingConfig;
use docqa_core::document::{normalize_text, sha256_hex, Document};
use docqa_core::error::{codes, AppError};

use super::model::Chunk;

/// Fixed-size sliding window over a document's characters.
///
/// Consecutive chunks share `overlap` characters; the final window is truncated
/// to the remaining text, never padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(AppError::new(
                codes::INVALID_CONFIGURATION,
                "Chunking requires chunk_size > 0 and 0 <= overlap < chunk_size",
            )
            .with_details(format!("chunk_size={chunk_size}; overlap={overlap}")));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_config(cfg: &ChunkingConfig) -> Result<Self, AppError> {
        Self::new(cfg.chunk_size, cfg.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        split_windows(&normalize_text(&document.raw_text), self.chunk_size, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let position = u32::try_from(i).unwrap_or(u32::MAX);
                Chunk {
                    id: chunk_id(&document.id, position, text),
                    document_id: document.id.clone(),
                    text: text.to_string(),
                    position,
                }
            })
            .collect()
    }
}

/// Windows are measured in chars so multi-byte text is never split inside a code point.
fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    // Byte offset of every char start, plus the end of the string.
    let mut bounds = text.char_indices().map(|(i, _)| i).collect::<Vec<_>>();
    let n = bounds.len();
    bounds.push(text.len());

    if n <= size {
        return vec![text];
    }

    let step = size - overlap;
    let mut out = Vec::with_capacity(n / step + 1);
    let mut start = 0usize;
    loop {
        let end = (start + size).min(n);
        out.push(&text[bounds[start]..bounds[end]]);
        if end == n {
            break;
        }
        start += step;
    }
    out
}

/// Content-derived chunk id: stable across rebuilds when the text is unchanged.
pub fn chunk_id(document_id: &str, position: u32, text: &str) -> String {
    let text_sha256 = sha256_hex(text.as_bytes());
    sha256_hex(format!("v1|{document_id}|{position}|{text_sha256}").as_bytes())
}
