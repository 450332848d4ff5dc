//! Ingest command handler.

use super::index::SnapshotIndex;
use clap::Args;
use std::path::Path;
use verity_core::{config::AppConfig, AppResult};
use verity_knowledge::ingest::{ingest_path, ingest_url, is_url, IngestOptions};
use verity_knowledge::{create_provider, DocumentProcessor, VectorIndex};

/// Add local documents or a web page to the vector index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// File, directory or http(s) URL to ingest
    pub source: String,

    /// Skip paths containing this substring (repeatable, directories only)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Reset the index before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for {}", self.source);

        let store = SnapshotIndex::open(config).await?;
        if self.reset {
            tracing::info!("Resetting vector index before ingest");
            store.index.reset()?;
        }

        let embedder = create_provider(&config.embedding)?;
        let processor =
            DocumentProcessor::from_settings(embedder, &config.retrieval, &config.timeouts);

        let stats = if is_url(&self.source) {
            let timeout = config.timeouts.web_search();
            ingest_url(&processor, store.index.as_ref(), &self.source, timeout).await?
        } else {
            let options = IngestOptions {
                exclude: self.exclude.clone(),
            };
            let path = Path::new(&self.source);
            ingest_path(&processor, store.index.as_ref(), path, &options).await?
        };
        store.persist().await?;

        if self.json {
            let output = serde_json::json!({
                "source": self.source,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "duplicateChunks": stats.duplicate_chunks,
                "failedChunks": stats.failed_chunks,
                "bytesProcessed": stats.bytes_processed,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        } else {
            println!("Ingested {}", self.source);
            println!("  Sources: {}", stats.sources_count);
            println!(
                "  Chunks: {} new, {} duplicate, {} failed",
                stats.chunks_count, stats.duplicate_chunks, stats.failed_chunks
            );
            println!("  Bytes: {}", stats.bytes_processed);
            println!("  Duration: {:.2}s", stats.duration_secs);
        }

        Ok(())
    }
}
