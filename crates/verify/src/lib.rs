//! Claim verification pipeline for Verity.
//!
//! A claim is answered in stages: hybrid retrieval over the local vector
//! index and the web, an evidence sufficiency check, cited answer synthesis
//! and a safety review. `Verifier` wires the stages to their collaborators
//! and is the single entry point for hosts.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use verity_core::config::AppConfig;
//! use verity_knowledge::MemoryIndex;
//! use verity_verify::Verifier;
//!
//! # async fn example() -> verity_core::AppResult<()> {
//! let config = AppConfig::load()?;
//! let verifier = Verifier::from_config(&config, Arc::new(MemoryIndex::new()))?;
//! let outcome = verifier.verify("The Eiffel Tower opened in 1889").await;
//! println!("{} ({:?})", outcome.answer_text, outcome.search_source);
//! # Ok(())
//! # }
//! ```

pub mod deadline;
pub mod evidence;
pub mod orchestrator;
pub mod reasoning;
pub mod retriever;
pub mod safety;
pub mod synthesizer;
pub mod types;
pub mod verifier;
pub mod web;

#[cfg(test)]
mod tests;

pub use deadline::CancelToken;
pub use orchestrator::{Orchestrator, PipelineLimits, PipelineStage, PipelineState};
pub use reasoning::{LlmReasoning, ReasoningService};
pub use retriever::{HybridRetriever, RetrieveMode, RetrieverSettings};
pub use types::{
    AnswerDraft, Citation, Conclusion, EvidenceVerdict, OutcomeFlags, RetrievalResult,
    SafetyVerdict, ScoredDocument, SearchSource, VerificationOutcome, VerificationStatus,
};
pub use verifier::Verifier;
pub use web::{create_web_search, TavilyClient, WebDocument, WebSearchProvider};
