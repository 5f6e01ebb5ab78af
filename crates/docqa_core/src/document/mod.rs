//! Source documents: discovery under a root directory, identity and change fingerprints.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{codes, AppError};

mod loader;

pub use loader::{DocumentLoader, PlainTextLoader};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Lowercase extension without the dot; empty when the file has none.
    pub format: String,
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime_ms: i64,
}

/// An extracted document. Identified by its path relative to the documents root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub source_path: PathBuf,
    pub raw_text: String,
    pub metadata: DocumentMeta,
}

/// A file found under the documents root, before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub id: String,
    pub path: PathBuf,
    pub meta: DocumentMeta,
    pub len: u64,
}

impl DocumentFile {
    pub fn into_document(self, raw_text: String) -> Document {
        Document {
            id: self.id,
            source_path: self.path,
            raw_text,
            metadata: self.meta,
        }
    }
}

/// Change-detection value persisted per document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub sha256: String,
    pub mtime_ms: i64,
    pub len: u64,
}

impl Fingerprint {
    pub fn compute(file: &DocumentFile, raw_text: &str) -> Self {
        Self {
            sha256: sha256_hex(raw_text.as_bytes()),
            mtime_ms: file.meta.mtime_ms,
            len: file.len,
        }
    }

    /// True when size and mtime are unchanged, so the file does not need to be read.
    pub fn matches_stat(&self, file: &DocumentFile) -> bool {
        self.mtime_ms == file.meta.mtime_ms && self.len == file.len
    }
}

/// List every regular file under `root`, skipping hidden entries, ordered by id.
///
/// Files in unsupported formats are returned too; the caller decides how to report them.
pub fn discover_documents(root: &Path) -> Result<Vec<DocumentFile>, AppError> {
    if !root.is_dir() {
        return Err(AppError::new(
            codes::EXTRACTION_FAILURE,
            "Documents directory not found",
        )
        .with_details(format!("path={}", root.display())));
    }

    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(err = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(|e| {
            AppError::new(codes::EXTRACTION_FAILURE, "Failed to stat document")
                .with_details(format!("path={}; err={}", entry.path().display(), e))
        })?;
        out.push(stat_file(root, entry.path(), &meta));
    }

    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

/// Root-relative path with `/` separators.
pub fn document_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

pub fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn stat_file(root: &Path, path: &Path, meta: &fs::Metadata) -> DocumentFile {
    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    let format = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    DocumentFile {
        id: document_id(root, path),
        path: path.to_path_buf(),
        meta: DocumentMeta { format, mtime_ms },
        len: meta.len(),
    }
}
