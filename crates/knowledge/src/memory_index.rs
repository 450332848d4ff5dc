//! In-memory vector index with single-writer discipline.
//!
//! Readers take a shared `RwLock` read guard and scan concurrently. Writers
//! first serialize on a writer mutex, then hold the write guard for a single
//! insert at a time, so a batch commit never starves readers for longer
//! than one insert.

use crate::types::{EmbeddedChunk, IndexStats, InsertOutcome, SearchHit, SourceType};
use crate::vector_index::{rank_order, similarity_score, VectorIndex};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use verity_core::{AppError, AppResult};

#[derive(Debug, Default)]
struct Entries {
    chunks: Vec<EmbeddedChunk>,
    by_hash: HashMap<String, usize>,
    dimensions: Option<usize>,
}

/// Shared in-memory vector index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<Entries>,
    writer: Mutex<()>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|_| AppError::Storage("vector index lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|_| AppError::Storage("vector index lock poisoned".to_string()))
    }

    fn lock_writer(&self) -> AppResult<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| AppError::Storage("vector index writer lock poisoned".to_string()))
    }

    /// Store one chunk. Caller must hold the writer mutex.
    fn commit_one(&self, chunk: EmbeddedChunk) -> AppResult<InsertOutcome> {
        let mut entries = self.write()?;

        if entries.by_hash.contains_key(chunk.content_hash()) {
            tracing::debug!(hash = %chunk.content_hash(), "Skipping duplicate chunk");
            return Ok(InsertOutcome::DuplicateHash);
        }

        let dim = chunk.embedding.len();
        match entries.dimensions {
            Some(expected) if expected != dim => {
                return Err(AppError::Storage(format!(
                    "Embedding dimension mismatch: index holds {}, chunk has {}",
                    expected, dim
                )));
            }
            None => entries.dimensions = Some(dim),
            _ => {}
        }

        let position = entries.chunks.len();
        entries
            .by_hash
            .insert(chunk.content_hash().to_string(), position);
        entries.chunks.push(chunk);
        Ok(InsertOutcome::Inserted)
    }
}

impl VectorIndex for MemoryIndex {
    fn insert(&self, chunk: EmbeddedChunk) -> AppResult<InsertOutcome> {
        let _writer = self.lock_writer()?;
        self.commit_one(chunk)
    }

    fn insert_batch(&self, chunks: Vec<EmbeddedChunk>) -> AppResult<Vec<InsertOutcome>> {
        let _writer = self.lock_writer()?;
        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            outcomes.push(self.commit_one(chunk)?);
        }

        let inserted = outcomes
            .iter()
            .filter(|o| **o == InsertOutcome::Inserted)
            .count();
        tracing::debug!(
            inserted,
            duplicates = outcomes.len() - inserted,
            "Committed chunk batch"
        );
        Ok(outcomes)
    }

    fn search(&self, query_embedding: &[f32], top_k: usize) -> AppResult<Vec<SearchHit>> {
        let entries = self.read()?;

        let mut hits: Vec<SearchHit> = entries
            .chunks
            .iter()
            .map(|stored| SearchHit {
                chunk: stored.chunk.clone(),
                score: similarity_score(query_embedding, &stored.embedding),
            })
            .collect();
        drop(entries);

        hits.sort_by(rank_order);
        hits.truncate(top_k);

        tracing::debug!(
            "Retrieved {} chunks (requested top-{})",
            hits.len(),
            top_k
        );
        Ok(hits)
    }

    fn get_by_hash(&self, content_hash: &str) -> AppResult<Option<EmbeddedChunk>> {
        let entries = self.read()?;
        Ok(entries
            .by_hash
            .get(content_hash)
            .and_then(|&i| entries.chunks.get(i))
            .cloned())
    }

    fn contains_hash(&self, content_hash: &str) -> AppResult<bool> {
        Ok(self.read()?.by_hash.contains_key(content_hash))
    }

    fn stats(&self) -> AppResult<IndexStats> {
        let entries = self.read()?;
        let sources: HashSet<&str> = entries
            .chunks
            .iter()
            .map(|c| c.chunk.source_locator.as_str())
            .collect();
        let web_chunks = entries
            .chunks
            .iter()
            .filter(|c| c.chunk.source_type == SourceType::Web)
            .count();

        Ok(IndexStats {
            chunks_count: entries.chunks.len(),
            sources_count: sources.len(),
            local_chunks: entries.chunks.len() - web_chunks,
            web_chunks,
            dimensions: entries.dimensions,
        })
    }

    fn reset(&self) -> AppResult<()> {
        let _writer = self.lock_writer()?;
        *self.write()? = Entries::default();
        tracing::info!("Reset vector index");
        Ok(())
    }

    fn export(&self) -> AppResult<Vec<EmbeddedChunk>> {
        Ok(self.read()?.chunks.clone())
    }
}
