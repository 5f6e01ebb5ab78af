use serde::{Deserialize, Serialize};

/// A bounded span of one document's text; the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    /// 0-based order within the document.
    pub position: u32,
}

/// Metadata stored next to each vector; enough to rebuild the `Chunk`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryMeta {
    pub document_id: String,
    pub position: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub meta: EntryMeta,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id,
            embedding,
            meta: EntryMeta {
                document_id: chunk.document_id,
                position: chunk.position,
                text: chunk.text,
            },
        }
    }

    pub fn chunk(&self) -> Chunk {
        Chunk {
            id: self.chunk_id.clone(),
            document_id: self.meta.document_id.clone(),
            text: self.meta.text.clone(),
            position: self.meta.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    pub chunk_id: String,
    pub score: f32,
}
