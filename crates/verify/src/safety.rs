//! Safety Reviewer.

use crate::deadline::{call_with_deadline, CancelToken};
use crate::reasoning::ReasoningService;
use crate::types::{AnswerDraft, SafetyVerdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use verity_core::AppResult;

/// Released when no draft passed review.
pub const SAFE_REFUSAL: &str = "We cannot provide a verified answer to this claim. \
Please consult official sources or qualified experts.";

pub const DISCLAIMER: &str = "Disclaimer: this analysis is based on publicly available \
sources and does not replace primary sources or expert advice. It offers no legal, \
medical or financial advice, and the information may be outdated or incomplete.";

const SENSITIVE_NOTE: &str = "Note: this answer touches on sensitive topics. \
Seek a qualified professional before acting on it.";

/// Phrases that mark an answer as touching sensitive ground.
const SENSITIVE_TERMS: [&str; 12] = [
    "legal advice",
    "lawyer",
    "lawsuit",
    "diagnosis",
    "medical treatment",
    "medication",
    "investment",
    "stock purchase",
    "financial advice",
    "violence",
    "hate",
    "discrimination",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Sensitive terms found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitivityReport {
    pub terms: Vec<&'static str>,
    pub risk: RiskLevel,
}

/// Scan `text` for sensitive terms.
pub fn scan_sensitive(text: &str) -> SensitivityReport {
    let lower = text.to_lowercase();
    let terms: Vec<&'static str> = SENSITIVE_TERMS
        .iter()
        .copied()
        .filter(|term| contains_word(&lower, term))
        .collect();
    let risk = match terms.len() {
        0 => RiskLevel::Low,
        1 | 2 => RiskLevel::Medium,
        _ => RiskLevel::High,
    };
    SensitivityReport { terms, risk }
}

/// Whole-word match, so "hate" does not match "whatever".
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub struct SafetyReviewer {
    reasoning: Arc<dyn ReasoningService>,
    timeout: Duration,
    append_disclaimer: bool,
}

impl SafetyReviewer {
    pub fn new(reasoning: Arc<dyn ReasoningService>, timeout: Duration, append_disclaimer: bool) -> Self {
        Self {
            reasoning,
            timeout,
            append_disclaimer,
        }
    }

    pub async fn review(
        &self,
        query: &str,
        draft: &AnswerDraft,
        cancel: &CancelToken,
    ) -> AppResult<SafetyVerdict> {
        let verdict = call_with_deadline(
            "reasoning",
            self.timeout,
            cancel,
            self.reasoning.review_answer(query, draft),
        )
        .await?;

        if verdict.approved {
            info!("Answer approved");
        } else {
            warn!(
                revised = verdict.revised_text.is_some(),
                reason = %verdict.reason,
                "Answer rejected by safety review"
            );
        }
        Ok(verdict)
    }

    /// Decorate released text with the sensitive-topic note and disclaimer.
    pub fn finalize(&self, text: &str) -> String {
        let mut out = text.trim_end().to_string();

        let report = scan_sensitive(text);
        if report.risk > RiskLevel::Low {
            info!(terms = ?report.terms, risk = ?report.risk, "Sensitive topics in answer");
            out.push_str("\n\n");
            out.push_str(SENSITIVE_NOTE);
        }
        if self.append_disclaimer {
            out.push_str("\n\n");
            out.push_str(DISCLAIMER);
        }
        out
    }
}
