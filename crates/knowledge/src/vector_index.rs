//! Vector index abstraction for embedded chunks.
//!
//! Defines a trait for provider-agnostic vector storage and retrieval.

use crate::snapshot;
use crate::types::{EmbeddedChunk, IndexStats, InsertOutcome, SearchHit};
use std::cmp::Ordering;
use std::path::Path;
use verity_core::AppResult;

/// Trait for vector index backends.
///
/// Implementations must support:
/// - Inserting chunks, as a no-op when the content hash is already stored
/// - Searching for similar vectors (top-k) concurrently with writers
/// - Collecting statistics
/// - Resetting/clearing the index
///
/// Writes are serialized by the implementation; all methods take `&self`
/// so a single index can be shared behind an `Arc` across queries.
pub trait VectorIndex: Send + Sync {
    /// Insert one chunk. A duplicate content hash is reported, not an error.
    fn insert(&self, chunk: EmbeddedChunk) -> AppResult<InsertOutcome>;

    /// Insert a batch under one writer critical section.
    ///
    /// Duplicates inside the batch are detected the same way as duplicates
    /// against existing content. Outcomes are returned in input order.
    fn insert_batch(&self, chunks: Vec<EmbeddedChunk>) -> AppResult<Vec<InsertOutcome>>;

    /// Search for the top-k most similar chunks to the query embedding.
    ///
    /// Scores are cosine similarity clamped to [0, 1]. Results are ordered by
    /// descending score, then newer source first, then insertion order.
    fn search(&self, query_embedding: &[f32], top_k: usize) -> AppResult<Vec<SearchHit>>;

    /// Look up a stored chunk by content hash.
    fn get_by_hash(&self, content_hash: &str) -> AppResult<Option<EmbeddedChunk>>;

    /// Whether a chunk with this content hash is stored.
    fn contains_hash(&self, content_hash: &str) -> AppResult<bool> {
        Ok(self.get_by_hash(content_hash)?.is_some())
    }

    /// Get statistics about the index.
    fn stats(&self) -> AppResult<IndexStats>;

    /// Reset the index, removing all chunks.
    fn reset(&self) -> AppResult<()>;

    /// All stored chunks in insertion order.
    fn export(&self) -> AppResult<Vec<EmbeddedChunk>>;

    /// Write the index content to a snapshot file. Returns the chunk count.
    fn persist(&self, path: &Path) -> AppResult<usize> {
        let chunks = self.export()?;
        snapshot::write_snapshot(path, &chunks)?;
        Ok(chunks.len())
    }

    /// Load a snapshot file into the index. Returns the number of chunks added.
    ///
    /// A missing file is an empty snapshot.
    fn load(&self, path: &Path) -> AppResult<usize> {
        let chunks = snapshot::read_snapshot(path)?;
        let outcomes = self.insert_batch(chunks)?;
        Ok(outcomes
            .iter()
            .filter(|o| **o == InsertOutcome::Inserted)
            .count())
    }
}

/// Calculate cosine similarity between two vectors.
///
/// Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine similarity mapped onto the shared [0, 1] relevance scale.
pub fn similarity_score(query: &[f32], candidate: &[f32]) -> f32 {
    let score = cosine_similarity(query, candidate);
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Ranking order shared by index search and merged retrieval results.
///
/// Higher score first, then newer source. Callers use a stable sort so
/// equal keys keep insertion order.
pub fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.chunk.recency().cmp(&a.chunk.recency()))
}
