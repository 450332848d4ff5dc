//! Document Processor: chunking plus embedding.
//!
//! The processor only builds `EmbeddedChunk`s transiently; ownership moves
//! to the vector index on insert.

use crate::chunker::chunk_text;
use crate::embeddings::EmbeddingProvider;
use crate::hashing::content_hash;
use crate::types::{Chunk, EmbeddedChunk, SourceMetadata};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use verity_core::config::{RetrievalSettings, TimeoutSettings};
use verity_core::{AppError, AppResult};

/// Outcome of embedding a set of chunks.
#[derive(Debug, Default)]
pub struct EmbedBatch {
    /// Chunks that now carry a vector, in input order
    pub embedded: Vec<EmbeddedChunk>,

    /// Chunks whose embedding failed, in input order
    pub failed: Vec<Chunk>,
}

/// Splits documents into chunks and embeds them.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
    embed_timeout: Duration,
}

impl DocumentProcessor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_size: usize,
        chunk_overlap: usize,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            chunk_size,
            chunk_overlap,
            embed_timeout,
        }
    }

    pub fn from_settings(
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: &RetrievalSettings,
        timeouts: &TimeoutSettings,
    ) -> Self {
        Self::new(
            embedder,
            retrieval.chunk_size,
            retrieval.chunk_overlap,
            timeouts.embedding(),
        )
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Split `raw_text` into overlapping chunks carrying `source` provenance.
    pub fn chunk(&self, raw_text: &str, source: &SourceMetadata) -> Vec<Chunk> {
        let created_at = Utc::now();

        chunk_text(raw_text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .map(|span| Chunk {
                id: uuid::Uuid::new_v4().to_string(),
                content_hash: content_hash(&span.text),
                text: span.text,
                source_type: source.source_type,
                source_locator: source.locator.clone(),
                chunk_index: span.index,
                created_at,
                published_at: source.published_at,
            })
            .collect()
    }

    /// Embed one text under the embedding deadline.
    async fn embed_text(&self, text: &str) -> AppResult<Vec<f32>> {
        let vector = tokio::time::timeout(self.embed_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| AppError::CollaboratorTimeout {
                service: "embedding",
                timeout: self.embed_timeout,
            })??;

        if vector.len() != self.embedder.dimensions() {
            return Err(AppError::EmbeddingFailure(format!(
                "Expected {} dimensions, got {}",
                self.embedder.dimensions(),
                vector.len()
            )));
        }
        Ok(vector)
    }

    /// Embed the query text.
    pub async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        self.embed_text(query).await
    }

    /// Embed one chunk.
    pub async fn embed(&self, chunk: &Chunk) -> AppResult<EmbeddedChunk> {
        let embedding = self.embed_text(&chunk.text).await?;
        Ok(EmbeddedChunk {
            chunk: chunk.clone(),
            embedding,
        })
    }

    /// Embed chunks concurrently. A failed chunk is logged and set aside;
    /// it never aborts its siblings.
    pub async fn embed_all(&self, chunks: Vec<Chunk>) -> EmbedBatch {
        let results = join_all(chunks.iter().map(|chunk| self.embed(chunk))).await;

        let mut batch = EmbedBatch::default();
        for (chunk, result) in chunks.into_iter().zip(results) {
            match result {
                Ok(embedded) => batch.embedded.push(embedded),
                Err(e) => {
                    tracing::warn!(
                        chunk_id = %chunk.id,
                        source = %chunk.source_locator,
                        "Dropping chunk after embedding failure: {}",
                        e
                    );
                    batch.failed.push(chunk);
                }
            }
        }
        batch
    }
}
