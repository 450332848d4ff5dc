//! Stats command handler.

use super::index::SnapshotIndex;
use clap::Args;
use verity_core::{config::AppConfig, AppResult};
use verity_knowledge::VectorIndex;

/// Show vector index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let store = SnapshotIndex::open(config).await?;
        let stats = store.index.stats()?;

        if self.json {
            let output = serde_json::json!({
                "snapshot": store.path,
                "chunksCount": stats.chunks_count,
                "sourcesCount": stats.sources_count,
                "localChunks": stats.local_chunks,
                "webChunks": stats.web_chunks,
                "dimensions": stats.dimensions,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        } else {
            println!("Vector index: {:?}", store.path);
            println!("  Chunks: {}", stats.chunks_count);
            println!("  Sources: {}", stats.sources_count);
            println!("  Local chunks: {}", stats.local_chunks);
            println!("  Web chunks: {}", stats.web_chunks);
            if let Some(dimensions) = stats.dimensions {
                println!("  Dimensions: {}", dimensions);
            }
        }

        Ok(())
    }
}
