//! SQLite snapshot/restore for the vector index.
//!
//! A snapshot is a full copy of the index content (chunks, vectors and
//! metadata) written in one transaction, so a crash mid-flush leaves the
//! previous snapshot intact.

use crate::types::{Chunk, EmbeddedChunk, SourceType};
use crate::vector_index::VectorIndex;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use verity_core::{AppError, AppResult};

/// Open (or create) the snapshot database.
fn open_snapshot(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Storage(format!("Failed to create snapshot directory: {}", e))
        })?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Storage(format!("Failed to open SQLite snapshot: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            seq INTEGER PRIMARY KEY,
            id TEXT NOT NULL,
            text TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_locator TEXT NOT NULL,
            content_hash TEXT NOT NULL UNIQUE,
            chunk_index INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            published_at TEXT,
            embedding BLOB NOT NULL
        );
        "#,
    )
    .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

    Ok(conn)
}

/// Replace the snapshot at `db_path` with `chunks`.
pub fn write_snapshot(db_path: &Path, chunks: &[EmbeddedChunk]) -> AppResult<()> {
    let mut conn = open_snapshot(db_path)?;
    let tx = conn
        .transaction()
        .map_err(|e| AppError::Storage(format!("Failed to begin snapshot transaction: {}", e)))?;

    tx.execute("DELETE FROM chunks", [])
        .map_err(|e| AppError::Storage(format!("Failed to clear snapshot: {}", e)))?;

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO chunks (seq, id, text, source_type, source_locator, content_hash,
                 chunk_index, created_at, published_at, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare insert: {}", e)))?;

        for (seq, stored) in chunks.iter().enumerate() {
            let chunk = &stored.chunk;
            stmt.execute(params![
                seq as i64,
                chunk.id,
                chunk.text,
                chunk.source_type.as_str(),
                chunk.source_locator,
                chunk.content_hash,
                chunk.chunk_index as i64,
                chunk.created_at.to_rfc3339(),
                chunk.published_at.map(|t| t.to_rfc3339()),
                embedding_to_bytes(&stored.embedding),
            ])
            .map_err(|e| AppError::Storage(format!("Failed to insert chunk: {}", e)))?;
        }
    }

    tx.commit()
        .map_err(|e| AppError::Storage(format!("Failed to commit snapshot: {}", e)))?;

    tracing::debug!("Wrote {} chunks to snapshot {:?}", chunks.len(), db_path);
    Ok(())
}

/// Read every chunk from the snapshot at `db_path`, in insertion order.
///
/// A missing file yields an empty list.
pub fn read_snapshot(db_path: &Path) -> AppResult<Vec<EmbeddedChunk>> {
    if !db_path.exists() {
        tracing::debug!("No snapshot at {:?}", db_path);
        return Ok(Vec::new());
    }

    let conn = open_snapshot(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, text, source_type, source_locator, content_hash, chunk_index,
             created_at, published_at, embedding FROM chunks ORDER BY seq",
        )
        .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                text: row.get(1)?,
                source_type: row.get(2)?,
                source_locator: row.get(3)?,
                content_hash: row.get(4)?,
                chunk_index: row.get(5)?,
                created_at: row.get(6)?,
                published_at: row.get(7)?,
                embedding: row.get(8)?,
            })
        })
        .map_err(|e| AppError::Storage(format!("Failed to query chunks: {}", e)))?;

    let mut chunks = Vec::new();
    for row in rows {
        let row = row.map_err(|e| AppError::Storage(format!("Failed to read row: {}", e)))?;
        chunks.push(row.into_chunk()?);
    }

    tracing::debug!("Read {} chunks from snapshot {:?}", chunks.len(), db_path);
    Ok(chunks)
}

struct RawRow {
    id: String,
    text: String,
    source_type: String,
    source_locator: String,
    content_hash: String,
    chunk_index: i64,
    created_at: String,
    published_at: Option<String>,
    embedding: Vec<u8>,
}

impl RawRow {
    fn into_chunk(self) -> AppResult<EmbeddedChunk> {
        let source_type = SourceType::parse(&self.source_type).ok_or_else(|| {
            AppError::Storage(format!("Unknown source type '{}'", self.source_type))
        })?;

        Ok(EmbeddedChunk {
            chunk: Chunk {
                id: self.id,
                text: self.text,
                source_type,
                source_locator: self.source_locator,
                content_hash: self.content_hash,
                chunk_index: self.chunk_index as u32,
                created_at: parse_time(&self.created_at)?,
                published_at: self.published_at.as_deref().map(parse_time).transpose()?,
            },
            embedding: bytes_to_embedding(&self.embedding)?,
        })
    }
}

fn parse_time(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Storage(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Persist `index` to `path` every `interval` until the task is aborted.
///
/// Flush errors are logged and the next tick retries.
pub fn spawn_flush_task(
    index: Arc<dyn VectorIndex>,
    path: PathBuf,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let index = Arc::clone(&index);
            let target = path.clone();
            match tokio::task::spawn_blocking(move || index.persist(&target)).await {
                Ok(Ok(count)) => tracing::debug!(count, "Flushed vector index snapshot"),
                Ok(Err(e)) => tracing::warn!("Snapshot flush failed: {}", e),
                Err(e) => tracing::warn!("Snapshot flush task panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::content_hash;
    use crate::memory_index::MemoryIndex;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample(id: &str, text: &str, source_type: SourceType) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: id.to_string(),
                text: text.to_string(),
                source_type,
                source_locator: "https://example.org/a".to_string(),
                content_hash: content_hash(text),
                chunk_index: 2,
                created_at: Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap(),
                published_at: Some(Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap()),
            },
            embedding: vec![0.25, -0.5, 1.0],
        }
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let temp = TempDir::new().unwrap();
        let chunks = read_snapshot(&temp.path().join("absent.sqlite")).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_snapshot_preserves_chunks_and_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("index.sqlite");
        let chunks = vec![
            sample("first", "first text", SourceType::Web),
            sample("second", "second text", SourceType::Local),
        ];

        write_snapshot(&path, &chunks).unwrap();
        let restored = read_snapshot(&path).unwrap();
        assert_eq!(restored, chunks);
    }

    #[test]
    fn test_rewrite_replaces_previous_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        write_snapshot(&path, &[sample("a", "one", SourceType::Local)]).unwrap();
        write_snapshot(&path, &[sample("b", "two", SourceType::Local)]).unwrap();

        let restored = read_snapshot(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].chunk.id, "b");
    }

    #[test]
    fn test_index_persist_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        let index = MemoryIndex::new();
        index.insert(sample("a", "alpha", SourceType::Web)).unwrap();
        index.insert(sample("b", "beta", SourceType::Local)).unwrap();
        assert_eq!(index.persist(&path).unwrap(), 2);

        let reloaded = MemoryIndex::new();
        assert_eq!(reloaded.load(&path).unwrap(), 2);
        assert!(reloaded.contains_hash(&content_hash("alpha")).unwrap());
        assert_eq!(reloaded.stats().unwrap().web_chunks, 1);
    }

    #[test]
    fn test_invalid_embedding_bytes() {
        assert!(bytes_to_embedding(&[0, 1, 2]).is_err());
        assert_eq!(
            bytes_to_embedding(&embedding_to_bytes(&[1.5, -2.0])).unwrap(),
            vec![1.5, -2.0]
        );
    }

    #[tokio::test]
    async fn test_flush_task_writes_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new());
        index.insert(sample("a", "alpha", SourceType::Web)).unwrap();

        let handle = spawn_flush_task(Arc::clone(&index), path.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(read_snapshot(&path).unwrap().len(), 1);
    }
}
