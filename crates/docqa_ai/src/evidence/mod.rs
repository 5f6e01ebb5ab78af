mod chunking;
mod fsutil;
pub mod index;
mod model;
mod store;

pub use chunking::{chunk_id, Chunker};
pub use index::{new_index, share, share_generation, LiveIndex, SharedIndex, VectorIndex};
pub use model::{Chunk, EntryMeta, IndexEntry, SimilarityResult};
pub use store::{IndexParams, Manifest, ManifestDocument, StateStore, MANIFEST_FORMAT_VERSION};
