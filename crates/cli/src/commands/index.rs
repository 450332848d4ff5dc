//! Snapshot-backed index handle shared by the commands.

use std::path::PathBuf;
use std::sync::Arc;
use verity_core::{config::AppConfig, AppError, AppResult};
use verity_knowledge::{MemoryIndex, VectorIndex};

/// The in-memory index together with the snapshot it was loaded from.
pub struct SnapshotIndex {
    pub index: Arc<MemoryIndex>,
    pub path: PathBuf,
}

impl SnapshotIndex {
    /// Load the configured snapshot. A missing snapshot yields an empty index.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        let path = config.snapshot_path();
        let index = Arc::new(MemoryIndex::new());

        let loaded = {
            let index = Arc::clone(&index);
            let path = path.clone();
            tokio::task::spawn_blocking(move || index.load(&path))
                .await
                .map_err(|e| AppError::Storage(format!("Snapshot load task failed: {}", e)))??
        };
        tracing::debug!(chunks = loaded, path = ?path, "Loaded vector index snapshot");

        Ok(Self { index, path })
    }

    /// Write the index back to its snapshot.
    pub async fn persist(&self) -> AppResult<usize> {
        let index = Arc::clone(&self.index);
        let path = self.path.clone();
        let count = tokio::task::spawn_blocking(move || index.persist(&path))
            .await
            .map_err(|e| AppError::Storage(format!("Snapshot write task failed: {}", e)))??;
        tracing::debug!(chunks = count, path = ?self.path, "Persisted vector index snapshot");
        Ok(count)
    }

    pub fn shared(&self) -> Arc<dyn VectorIndex> {
        self.index.clone()
    }
}
