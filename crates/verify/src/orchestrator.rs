//! Pipeline Orchestrator.
//!
//! Drives one query through
//! `Init -> Retrieve -> CheckEvidence -> {Retrieve | Synthesize} -> Review -> {Synthesize | Done}`,
//! with `Failed` reachable from any non-terminal stage. Evidence shortfalls
//! and safety rejections loop back a bounded number of times. Running out of
//! attempts is a flagged outcome, never an error.

use crate::deadline::CancelToken;
use crate::evidence::EvidenceChecker;
use crate::retriever::{HybridRetriever, RetrieveMode};
use crate::safety::{SafetyReviewer, SAFE_REFUSAL};
use crate::synthesizer::{resolve_citations, AnswerSynthesizer};
use crate::types::{AnswerDraft, Conclusion, EvidenceVerdict, RetrievalResult, SafetyVerdict};
use std::fmt;
use tracing::{info, warn};
use verity_core::config::PipelineSettings;
use verity_core::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Retrieve,
    CheckEvidence,
    Synthesize,
    Review,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "INIT",
            PipelineStage::Retrieve => "RETRIEVE",
            PipelineStage::CheckEvidence => "CHECK_EVIDENCE",
            PipelineStage::Synthesize => "SYNTHESIZE",
            PipelineStage::Review => "REVIEW",
            PipelineStage::Done => "DONE",
            PipelineStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Retry budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLimits {
    pub max_retrieve_attempts: u32,
    pub max_answer_attempts: u32,
}

impl From<&PipelineSettings> for PipelineLimits {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_retrieve_attempts: settings.max_retrieve_attempts,
            max_answer_attempts: settings.max_answer_attempts,
        }
    }
}

/// What was released at `Done`.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalAnswer {
    pub text: String,
    pub citations: Vec<String>,
    pub confidence: f32,
    pub conclusion: Conclusion,
    pub safe_refusal: bool,
}

/// Per-query state, owned by one `run` call.
#[derive(Debug)]
pub struct PipelineState {
    pub query: String,
    pub stage: PipelineStage,
    pub retrieval_result: Option<RetrievalResult>,
    pub evidence_verdict: Option<EvidenceVerdict>,
    pub answer_draft: Option<AnswerDraft>,
    pub safety_verdict: Option<SafetyVerdict>,
    pub retrieve_attempts: u32,
    pub answer_attempts: u32,
    pub low_confidence: bool,
    pub evidence_budget_exhausted: bool,
    pub safety_budget_exhausted: bool,
    pub final_answer: Option<FinalAnswer>,
    pub error: Option<AppError>,
}

impl PipelineState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            stage: PipelineStage::Init,
            retrieval_result: None,
            evidence_verdict: None,
            answer_draft: None,
            safety_verdict: None,
            retrieve_attempts: 0,
            answer_attempts: 0,
            low_confidence: false,
            evidence_budget_exhausted: false,
            safety_budget_exhausted: false,
            final_answer: None,
            error: None,
        }
    }

    fn retrieval(&self) -> AppResult<&RetrievalResult> {
        self.retrieval_result
            .as_ref()
            .ok_or_else(|| missing("retrieval result", self.stage))
    }

    fn draft(&self) -> AppResult<&AnswerDraft> {
        self.answer_draft
            .as_ref()
            .ok_or_else(|| missing("answer draft", self.stage))
    }
}

fn missing(what: &str, stage: PipelineStage) -> AppError {
    AppError::UnrecoverableState(format!("No {} at stage {}", what, stage))
}

pub struct Orchestrator {
    retriever: HybridRetriever,
    checker: EvidenceChecker,
    synthesizer: AnswerSynthesizer,
    reviewer: SafetyReviewer,
    limits: PipelineLimits,
}

impl Orchestrator {
    pub fn new(
        retriever: HybridRetriever,
        checker: EvidenceChecker,
        synthesizer: AnswerSynthesizer,
        reviewer: SafetyReviewer,
        limits: PipelineLimits,
    ) -> Self {
        Self {
            retriever,
            checker,
            synthesizer,
            reviewer,
            limits,
        }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn reviewer(&self) -> &SafetyReviewer {
        &self.reviewer
    }

    /// Run `query` to a terminal stage.
    pub async fn run(&self, query: &str, cancel: &CancelToken) -> PipelineState {
        let mut state = PipelineState::new(query);

        while !state.stage.is_terminal() {
            let from = state.stage;
            let next = match cancel.check() {
                Ok(()) => self.step(&mut state, cancel).await,
                Err(e) => Err(e),
            };

            state.stage = match next {
                Ok(stage) => stage,
                Err(e) => {
                    warn!(stage = %from, "Pipeline failed: {}", e);
                    state.error = Some(e);
                    PipelineStage::Failed
                }
            };
            info!(from = %from, to = %state.stage, "Stage transition");
        }

        state
    }

    async fn step(&self, state: &mut PipelineState, cancel: &CancelToken) -> AppResult<PipelineStage> {
        match state.stage {
            PipelineStage::Init => Ok(PipelineStage::Retrieve),

            PipelineStage::Retrieve => {
                // A retry must not land on the same local-only result.
                let mode = if state.retrieve_attempts > 0 {
                    RetrieveMode::ForceWeb
                } else {
                    RetrieveMode::Auto
                };
                let result = self.retriever.retrieve(&state.query, mode, cancel).await?;
                info!(
                    source = %result.search_source,
                    documents = result.documents.len(),
                    local = result.local_count,
                    web = result.web_count,
                    "Retrieved evidence"
                );
                state.retrieval_result = Some(result);
                Ok(PipelineStage::CheckEvidence)
            }

            PipelineStage::CheckEvidence => {
                let verdict = self
                    .checker
                    .check(&state.query, state.retrieval()?, cancel)
                    .await?;
                let sufficient = verdict.sufficient;
                state.evidence_verdict = Some(verdict);

                if sufficient {
                    Ok(PipelineStage::Synthesize)
                } else if state.retrieve_attempts < self.limits.max_retrieve_attempts {
                    state.retrieve_attempts += 1;
                    Ok(PipelineStage::Retrieve)
                } else {
                    info!("Evidence still insufficient; answering with low confidence");
                    state.low_confidence = true;
                    state.evidence_budget_exhausted = true;
                    Ok(PipelineStage::Synthesize)
                }
            }

            PipelineStage::Synthesize => {
                let draft = self
                    .synthesizer
                    .synthesize(
                        &state.query,
                        state.retrieval()?,
                        state.low_confidence,
                        cancel,
                    )
                    .await?;
                state.answer_draft = Some(draft);
                state.safety_verdict = None;
                Ok(PipelineStage::Review)
            }

            PipelineStage::Review => {
                let verdict = self.reviewer.review(&state.query, state.draft()?, cancel).await?;
                let final_answer = if verdict.approved {
                    Some(released(state.draft()?))
                } else if let Some(revised) = &verdict.revised_text {
                    Some(revision(state.draft()?, revised))
                } else if state.answer_attempts < self.limits.max_answer_attempts {
                    state.answer_attempts += 1;
                    None
                } else {
                    info!("Safety review budget spent; releasing the safe refusal");
                    state.safety_budget_exhausted = true;
                    Some(refusal())
                };
                state.safety_verdict = Some(verdict);

                match final_answer {
                    Some(answer) => {
                        state.final_answer = Some(answer);
                        Ok(PipelineStage::Done)
                    }
                    None => Ok(PipelineStage::Synthesize),
                }
            }

            PipelineStage::Done | PipelineStage::Failed => Err(AppError::UnrecoverableState(
                format!("Step requested from terminal stage {}", state.stage),
            )),
        }
    }
}

fn released(draft: &AnswerDraft) -> FinalAnswer {
    FinalAnswer {
        text: draft.text.clone(),
        citations: draft.citations.clone(),
        confidence: draft.confidence,
        conclusion: draft.conclusion,
        safe_refusal: false,
    }
}

/// Accept a reviewer's revision, keeping only citations it still uses.
fn revision(draft: &AnswerDraft, revised: &str) -> FinalAnswer {
    let (text, citations) = resolve_citations(revised, draft.citations.len(), |label| {
        label
            .checked_sub(1)
            .and_then(|i| draft.citations.get(i))
            .cloned()
    });
    FinalAnswer {
        text,
        citations,
        confidence: draft.confidence,
        conclusion: draft.conclusion,
        safe_refusal: false,
    }
}

fn refusal() -> FinalAnswer {
    FinalAnswer {
        text: SAFE_REFUSAL.to_string(),
        citations: Vec::new(),
        confidence: 0.0,
        conclusion: Conclusion::Insufficient,
        safe_refusal: true,
    }
}
