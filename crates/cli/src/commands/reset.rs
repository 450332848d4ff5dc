//! Reset command handler.

use super::index::SnapshotIndex;
use clap::Args;
use verity_core::{config::AppConfig, AppError, AppResult};
use verity_knowledge::VectorIndex;

/// Remove every chunk from the vector index
#[derive(Args, Debug)]
pub struct ResetCommand {
    /// Confirm the reset
    #[arg(short, long)]
    pub yes: bool,
}

impl ResetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if !self.yes {
            return Err(AppError::Config(
                "Reset removes every indexed chunk; pass --yes to confirm".to_string(),
            ));
        }
        tracing::info!("Executing reset command");

        let store = SnapshotIndex::open(config).await?;
        let removed = store.index.stats()?.chunks_count;
        store.index.reset()?;
        store.persist().await?;

        println!("Removed {} chunk(s) from {:?}", removed, store.path);
        Ok(())
    }
}
