//! Evidence Checker.

use crate::deadline::{call_with_deadline, CancelToken};
use crate::reasoning::ReasoningService;
use crate::types::{EvidenceItem, EvidenceVerdict, RetrievalResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use verity_core::AppResult;

/// Judges whether retrieved evidence is enough to answer the claim.
///
/// Has no side effects on the index.
pub struct EvidenceChecker {
    reasoning: Arc<dyn ReasoningService>,
    timeout: Duration,
}

impl EvidenceChecker {
    pub fn new(reasoning: Arc<dyn ReasoningService>, timeout: Duration) -> Self {
        Self { reasoning, timeout }
    }

    pub async fn check(
        &self,
        query: &str,
        result: &RetrievalResult,
        cancel: &CancelToken,
    ) -> AppResult<EvidenceVerdict> {
        if result.is_empty() {
            info!("No evidence retrieved; insufficient without consulting reasoning");
            return Ok(EvidenceVerdict {
                sufficient: false,
                rationale: "No evidence was retrieved for this claim.".to_string(),
            });
        }

        let evidence = evidence_items(result);
        let verdict = call_with_deadline(
            "reasoning",
            self.timeout,
            cancel,
            self.reasoning.classify_evidence(query, &evidence),
        )
        .await?;

        info!(
            sufficient = verdict.sufficient,
            documents = evidence.len(),
            mean_score = result.mean_score(),
            "Evidence checked"
        );
        Ok(verdict)
    }
}

/// All evidence in rank order, labelled from 1.
pub(crate) fn evidence_items(result: &RetrievalResult) -> Vec<EvidenceItem> {
    result
        .evidence()
        .enumerate()
        .map(|(i, (doc, chunk))| EvidenceItem::from_chunk(i + 1, chunk, doc.similarity_score))
        .collect()
}
