//! Verify command handler.
//!
//! Runs each claim through the verification pipeline. Claims share one
//! index and are verified concurrently; Ctrl-C cancels every query still
//! in flight.

use super::index::SnapshotIndex;
use clap::Args;
use futures::future::join_all;
use std::path::PathBuf;
use std::time::Duration;
use verity_core::{config::AppConfig, AppError, AppResult};
use verity_knowledge::snapshot::spawn_flush_task;
use verity_verify::{CancelToken, VerificationOutcome, Verifier};

/// Verify one or more claims
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Claims to verify
    pub claims: Vec<String>,

    /// Read additional claims from a file, one per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let claims = self.collect_claims()?;
        if claims.is_empty() {
            return Err(AppError::Config(
                "No claims given. Pass claims as arguments or with --file".to_string(),
            ));
        }
        tracing::info!("Executing verify command for {} claim(s)", claims.len());

        let store = SnapshotIndex::open(config).await?;
        let verifier = Verifier::from_config(config, store.shared())?;

        let flusher = (claims.len() > 1 && config.index.flush_interval_secs > 0).then(|| {
            spawn_flush_task(
                store.shared(),
                store.path.clone(),
                Duration::from_secs(config.index.flush_interval_secs),
            )
        });

        let cancel = CancelToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling verification");
                    cancel.cancel();
                }
            })
        };

        let outcomes = join_all(
            claims
                .iter()
                .map(|claim| verifier.verify_with_cancel(claim, &cancel)),
        )
        .await;

        interrupt.abort();
        if let Some(flusher) = flusher {
            flusher.abort();
        }
        store.persist().await?;

        if self.json {
            let output = if outcomes.len() == 1 {
                serde_json::to_value(&outcomes[0])
            } else {
                serde_json::to_value(&outcomes)
            }
            .map_err(|e| AppError::Serialization(e.to_string()))?;
            let text = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", text);
        } else {
            for (claim, outcome) in claims.iter().zip(&outcomes) {
                print_outcome(claim, outcome);
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_done()).count();
        if failed > 0 {
            return Err(AppError::UnrecoverableState(format!(
                "{} of {} claim(s) failed verification",
                failed,
                outcomes.len()
            )));
        }
        Ok(())
    }

    fn collect_claims(&self) -> AppResult<Vec<String>> {
        let mut claims: Vec<String> = self.claims.clone();
        if let Some(path) = &self.file {
            let contents = std::fs::read_to_string(path)?;
            claims.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string),
            );
        }
        Ok(claims)
    }
}

fn print_outcome(claim: &str, outcome: &VerificationOutcome) {
    println!("Claim: {}", claim);
    if let Some(error) = &outcome.error {
        println!("  Failed: {}", error);
        println!();
        return;
    }

    println!("  Conclusion: {}", outcome.conclusion);
    println!("  Confidence: {:.2}", outcome.confidence);
    if let Some(source) = outcome.search_source {
        println!(
            "  Sources: {} ({} local, {} web)",
            source, outcome.local_count, outcome.web_count
        );
    }
    if outcome.flags.web_search_degraded {
        println!("  Web search was unavailable; local evidence only");
    }
    println!();
    println!("{}", outcome.answer_text);
    if !outcome.citations.is_empty() {
        println!();
        for (n, citation) in outcome.citations.iter().enumerate() {
            println!(
                "  [{}] {} ({})",
                n + 1,
                citation.source_locator,
                citation.source_type
            );
        }
    }
    println!();
}
