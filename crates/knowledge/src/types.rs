//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a chunk's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Web,
}

impl SourceType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Web => "web",
        }
    }

    /// Parse the stored representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance attached to every chunk cut from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Local file or remote page
    pub source_type: SourceType,

    /// File path or URL
    pub locator: String,

    /// Publication time reported by the source, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl SourceMetadata {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Local,
            locator: path.into(),
            published_at: None,
        }
    }

    pub fn web(url: impl Into<String>, published_at: Option<DateTime<Utc>>) -> Self {
        Self {
            source_type: SourceType::Web,
            locator: url.into(),
            published_at,
        }
    }
}

/// A bounded span of source text with attached provenance.
///
/// Chunks are immutable once created; `content_hash` is the digest of the
/// normalized text and is the deduplication key of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: String,

    /// Text content
    pub text: String,

    /// Local or web
    pub source_type: SourceType,

    /// File path or URL
    pub source_locator: String,

    /// SHA-256 of the normalized text
    pub content_hash: String,

    /// Position within source
    pub chunk_index: u32,

    /// When the chunk was cut
    pub created_at: DateTime<Utc>,

    /// Publication time of the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Chunk {
    /// Timestamp used for recency tie-breaks: publication time, else creation time.
    pub fn recency(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// A chunk plus its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn content_hash(&self) -> &str {
        &self.chunk.content_hash
    }
}

/// Result of inserting one chunk into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The chunk is now stored.
    Inserted,
    /// A chunk with the same content hash already existed; nothing changed.
    DuplicateHash,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,

    /// Cosine similarity clamped to [0, 1]
    pub score: f32,
}

/// Statistics for the vector index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of stored chunks
    pub chunks_count: usize,

    /// Number of distinct source locators
    pub sources_count: usize,

    /// Chunks from local documents
    pub local_chunks: usize,

    /// Chunks discovered through web search
    pub web_chunks: usize,

    /// Embedding dimension, once the first chunk has been stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

/// Statistics from an ingest operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Number of files processed
    pub sources_count: u32,

    /// Number of chunks inserted
    pub chunks_count: u32,

    /// Chunks skipped because their hash was already indexed
    pub duplicate_chunks: u32,

    /// Chunks dropped because embedding failed
    pub failed_chunks: u32,

    /// Total bytes processed
    pub bytes_processed: u64,

    /// Duration in seconds
    pub duration_secs: f64,
}
