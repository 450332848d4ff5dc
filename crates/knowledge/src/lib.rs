//! Knowledge storage for Verity.
//!
//! Chunks documents, embeds them through a pluggable embedding service, and
//! keeps them in a shared vector index with content-hash deduplication and
//! SQLite snapshots.
//!
//! # Example
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use verity_knowledge::{ingest, DocumentProcessor, MemoryIndex, MockProvider};
//!
//! # async fn example() -> verity_core::AppResult<()> {
//! let processor = DocumentProcessor::new(
//!     Arc::new(MockProvider::new(384)),
//!     1000,
//!     200,
//!     Duration::from_secs(10),
//! );
//! let index = MemoryIndex::new();
//! let stats = ingest::ingest_path(&processor, &index, Path::new("docs"), &Default::default()).await?;
//! println!("{} chunks", stats.chunks_count);
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod embeddings;
pub mod hashing;
pub mod ingest;
pub mod memory_index;
pub mod parser;
pub mod processor;
pub mod snapshot;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider, MockProvider, OllamaProvider};
pub use hashing::content_hash;
pub use memory_index::MemoryIndex;
pub use processor::{DocumentProcessor, EmbedBatch};
pub use types::{
    Chunk, EmbeddedChunk, IndexStats, IngestStats, InsertOutcome, SearchHit, SourceMetadata,
    SourceType,
};
pub use vector_index::{similarity_score, VectorIndex};
