//! Reasoning collaborator.
//!
//! The pipeline treats the language model as three opaque calls: classify
//! evidence sufficiency, synthesize a cited answer, and review an answer for
//! safety. `LlmReasoning` implements them over any `LlmClient`.

mod llm;
mod parse;
mod prompts;

pub use llm::LlmReasoning;
pub use parse::{parse_answer, parse_evidence_verdict, parse_safety_verdict};

use crate::types::{AnswerDraft, EvidenceItem, EvidenceVerdict, GeneratedAnswer, SafetyVerdict};
use async_trait::async_trait;
use verity_core::AppResult;

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Decide whether `evidence` is enough to judge `query`.
    async fn classify_evidence(
        &self,
        query: &str,
        evidence: &[EvidenceItem],
    ) -> AppResult<EvidenceVerdict>;

    /// Write an answer citing evidence by `[label]` markers.
    async fn synthesize_answer(
        &self,
        query: &str,
        evidence: &[EvidenceItem],
        low_confidence: bool,
    ) -> AppResult<GeneratedAnswer>;

    /// Approve, revise or reject a draft answer.
    async fn review_answer(&self, query: &str, draft: &AnswerDraft) -> AppResult<SafetyVerdict>;
}
