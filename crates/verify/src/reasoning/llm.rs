//! Reasoning over a language model.

use super::parse::{parse_answer, parse_evidence_verdict, parse_safety_verdict};
use super::prompts;
use super::ReasoningService;
use crate::types::{AnswerDraft, EvidenceItem, EvidenceVerdict, GeneratedAnswer, SafetyVerdict};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use verity_core::{AppError, AppResult};
use verity_llm::{LlmClient, LlmRequest};

const SERVICE: &str = "reasoning";

/// `ReasoningService` that prompts an LLM and parses its line-oriented reply.
///
/// Transport errors become `CollaboratorFailure`; a reply that cannot be
/// parsed is an `UnrecoverableState`.
pub struct LlmReasoning {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmReasoning {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn ask(&self, system: String, prompt: String, max_tokens: u32) -> AppResult<String> {
        // Low temperature: the replies are parsed.
        let request = LlmRequest::new(prompt, &self.model)
            .with_system(system)
            .with_temperature(0.1)
            .with_max_tokens(max_tokens);

        let response = self.client.complete(&request).await.map_err(|e| match e {
            AppError::Llm(message) => AppError::collaborator(SERVICE, message),
            other => other,
        })?;

        debug!(
            provider = self.client.provider_name(),
            chars = response.content.len(),
            "Reasoning reply received"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl ReasoningService for LlmReasoning {
    #[instrument(skip_all, fields(evidence = evidence.len()))]
    async fn classify_evidence(
        &self,
        query: &str,
        evidence: &[EvidenceItem],
    ) -> AppResult<EvidenceVerdict> {
        let reply = self
            .ask(
                prompts::EVIDENCE_SYSTEM.to_string(),
                prompts::evidence_prompt(query, evidence),
                200,
            )
            .await?;
        parse_evidence_verdict(&reply)
    }

    #[instrument(skip_all, fields(evidence = evidence.len(), low_confidence = low_confidence))]
    async fn synthesize_answer(
        &self,
        query: &str,
        evidence: &[EvidenceItem],
        low_confidence: bool,
    ) -> AppResult<GeneratedAnswer> {
        let reply = self
            .ask(
                prompts::answer_system(low_confidence),
                prompts::answer_prompt(query, evidence),
                1000,
            )
            .await?;
        parse_answer(&reply)
    }

    #[instrument(skip_all)]
    async fn review_answer(&self, query: &str, draft: &AnswerDraft) -> AppResult<SafetyVerdict> {
        let reply = self
            .ask(
                prompts::REVIEW_SYSTEM.to_string(),
                prompts::review_prompt(query, draft),
                1000,
            )
            .await?;
        parse_safety_verdict(&reply)
    }
}
