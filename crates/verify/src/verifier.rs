//! The `verify` entry point exposed to hosts.

use crate::deadline::CancelToken;
use crate::evidence::EvidenceChecker;
use crate::orchestrator::{Orchestrator, PipelineLimits, PipelineStage, PipelineState};
use crate::reasoning::{LlmReasoning, ReasoningService};
use crate::retriever::{HybridRetriever, RetrieverSettings};
use crate::safety::SafetyReviewer;
use crate::synthesizer::AnswerSynthesizer;
use crate::types::{
    Citation, Conclusion, OutcomeFlags, VerificationOutcome, VerificationStatus,
};
use crate::web::{create_web_search, WebSearchProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use verity_core::config::AppConfig;
use verity_core::{AppError, AppResult};
use verity_knowledge::{create_provider, DocumentProcessor, EmbeddingProvider, VectorIndex};

/// Verifies claims against a shared vector index.
///
/// One `Verifier` serves any number of concurrent queries; each call gets
/// its own pipeline state and only the index is shared.
pub struct Verifier {
    orchestrator: Orchestrator,
}

impl Verifier {
    /// Build a verifier with the collaborators named in `config`.
    pub fn from_config(config: &AppConfig, index: Arc<dyn VectorIndex>) -> AppResult<Self> {
        let embedder = create_provider(&config.embedding)?;
        let web = create_web_search(&config.web_search, config.resolve_web_search_key())?;
        let client = verity_llm::create_client(
            &config.provider,
            config.provider_endpoint().as_deref(),
        )?;
        let reasoning: Arc<dyn ReasoningService> =
            Arc::new(LlmReasoning::new(client, config.model.clone()));

        info!(
            embedder = embedder.provider_name(),
            web = web.provider_name(),
            reasoning = %config.provider,
            model = %config.model,
            "Verifier ready"
        );
        Ok(Self::with_collaborators(config, index, embedder, web, reasoning))
    }

    /// Build a verifier around explicit collaborators.
    pub fn with_collaborators(
        config: &AppConfig,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        web: Arc<dyn WebSearchProvider>,
        reasoning: Arc<dyn ReasoningService>,
    ) -> Self {
        let reasoning_timeout = config.timeouts.reasoning();
        let processor =
            DocumentProcessor::from_settings(embedder, &config.retrieval, &config.timeouts);

        let orchestrator = Orchestrator::new(
            HybridRetriever::new(processor, index, web, RetrieverSettings::from_config(config)),
            EvidenceChecker::new(Arc::clone(&reasoning), reasoning_timeout),
            AnswerSynthesizer::new(
                Arc::clone(&reasoning),
                reasoning_timeout,
                config.pipeline.prefer_web_citations_for_hybrid,
            ),
            SafetyReviewer::new(reasoning, reasoning_timeout, config.pipeline.append_disclaimer),
            PipelineLimits::from(&config.pipeline),
        );

        Self { orchestrator }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.orchestrator.retriever().index()
    }

    pub async fn verify(&self, query: &str) -> VerificationOutcome {
        self.verify_with_cancel(query, &CancelToken::new()).await
    }

    /// Verify `query`, stopping at the next collaborator call once `cancel`
    /// fires. A cancelled query ends `Failed`.
    pub async fn verify_with_cancel(&self, query: &str, cancel: &CancelToken) -> VerificationOutcome {
        let query_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("verify", query_id = %query_id);

        async {
            let start = Instant::now();
            info!(query = %query, "Verifying claim");

            let state = if query.trim().is_empty() {
                let mut state = PipelineState::new(query);
                state.stage = PipelineStage::Failed;
                state.error = Some(AppError::UnrecoverableState(
                    "Query text is empty".to_string(),
                ));
                state
            } else {
                self.orchestrator.run(query, cancel).await
            };

            let outcome = self.outcome(query_id.clone(), state);
            info!(
                status = ?outcome.status,
                source = ?outcome.search_source,
                confidence = outcome.confidence,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Verification finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    fn outcome(&self, query_id: String, state: PipelineState) -> VerificationOutcome {
        let retrieval = state.retrieval_result.as_ref();
        let mut flags = OutcomeFlags {
            low_confidence: state.low_confidence,
            evidence_budget_exhausted: state.evidence_budget_exhausted,
            safety_budget_exhausted: state.safety_budget_exhausted,
            safe_refusal: false,
            web_search_degraded: retrieval.is_some_and(|r| r.web_degraded),
        };

        let mut outcome = VerificationOutcome {
            query_id,
            status: VerificationStatus::Failed,
            answer_text: String::new(),
            citations: Vec::new(),
            search_source: retrieval.map(|r| r.search_source),
            confidence: 0.0,
            local_count: retrieval.map_or(0, |r| r.local_count),
            web_count: retrieval.map_or(0, |r| r.web_count),
            conclusion: Conclusion::Insufficient,
            flags: OutcomeFlags::default(),
            retrieve_attempts: state.retrieve_attempts,
            answer_attempts: state.answer_attempts,
            error: None,
        };

        match (state.stage, state.final_answer) {
            (PipelineStage::Done, Some(answer)) => {
                flags.safe_refusal = answer.safe_refusal;
                outcome.status = VerificationStatus::Done;
                outcome.answer_text = if answer.safe_refusal {
                    answer.text
                } else {
                    self.orchestrator.reviewer().finalize(&answer.text)
                };
                outcome.citations = answer
                    .citations
                    .iter()
                    .filter_map(|id| retrieval.and_then(|r| r.chunk(id)))
                    .map(|chunk| Citation {
                        chunk_id: chunk.id.clone(),
                        source_type: chunk.source_type,
                        source_locator: chunk.source_locator.clone(),
                    })
                    .collect();
                outcome.confidence = answer.confidence;
                outcome.conclusion = answer.conclusion;
            }
            _ => {
                let error = state.error.unwrap_or_else(|| {
                    AppError::UnrecoverableState("Pipeline ended without an answer".to_string())
                });
                outcome.answer_text = format!("Verification failed: {}", error);
                outcome.error = Some(error.to_string());
            }
        }

        outcome.flags = flags;
        outcome
    }
}
