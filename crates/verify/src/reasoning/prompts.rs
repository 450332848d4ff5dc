//! Prompt text for the reasoning calls.

use crate::types::{AnswerDraft, EvidenceItem};

/// Longest evidence excerpt placed in a prompt, in characters.
const MAX_EVIDENCE_CHARS: usize = 1500;

pub(crate) const EVIDENCE_SYSTEM: &str = "You are a fact-checking assistant. \
You judge whether retrieved evidence is enough to verify a claim.\n\n\
Instructions:\n\
- Consider how many pieces of evidence there are, how relevant they are, and whether they cover the claim\n\
- Contradictory evidence still counts as sufficient when it addresses the claim\n\
- Reply with exactly these lines:\n\
DECISION: SUFFICIENT or INSUFFICIENT\n\
RATIONALE: one or two sentences\n";

pub(crate) const ANSWER_SYSTEM: &str = "You are a fact-checking assistant that writes verified answers to claims.\n\n\
Instructions:\n\
- Base the answer only on the evidence provided\n\
- Cite evidence inline with its bracketed number, e.g. [1] or [2]\n\
- Only put a marker after a statement that the cited evidence supports\n\
- Be objective and use plain language\n\
- Reply with exactly this layout:\n\
CONCLUSION: TRUE, FALSE, PARTIALLY TRUE or INSUFFICIENT\n\
CONFIDENCE: a number between 0 and 1\n\
ANSWER: the explanation with citation markers\n";

const LOW_CONFIDENCE_NOTE: &str = "Note: the evidence may not fully cover this claim. \
Say clearly what the evidence does and does not establish.\n\n";

pub(crate) const REVIEW_SYSTEM: &str = "You review fact-checking answers before release.\n\n\
Check that the answer:\n\
- contains no harmful, offensive or discriminatory content\n\
- gives no personalised legal, medical or financial advice\n\
- does not overstate what the evidence shows\n\n\
Reply with exactly these lines:\n\
DECISION: APPROVE, MODIFY or REJECT\n\
REASON: one sentence\n\
REVISED: the corrected answer, only when the decision is MODIFY\n";

pub(crate) fn answer_system(low_confidence: bool) -> String {
    if low_confidence {
        format!("{}{}", LOW_CONFIDENCE_NOTE, ANSWER_SYSTEM)
    } else {
        ANSWER_SYSTEM.to_string()
    }
}

/// Render evidence as numbered blocks.
pub(crate) fn build_evidence_context(evidence: &[EvidenceItem]) -> String {
    if evidence.is_empty() {
        return "(no evidence found)".to_string();
    }

    evidence
        .iter()
        .map(|item| {
            format!(
                "[{}] source: {} ({}), relevance: {:.2}\n{}",
                item.label,
                item.source_locator,
                item.source_type,
                item.score,
                truncate(&item.text, MAX_EVIDENCE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub(crate) fn evidence_prompt(query: &str, evidence: &[EvidenceItem]) -> String {
    format!(
        "Claim:\n{}\n\nEvidence ({} items):\n{}",
        query,
        evidence.len(),
        build_evidence_context(evidence)
    )
}

pub(crate) fn answer_prompt(query: &str, evidence: &[EvidenceItem]) -> String {
    format!(
        "Claim to verify:\n{}\n\nEvidence:\n{}",
        query,
        build_evidence_context(evidence)
    )
}

pub(crate) fn review_prompt(query: &str, draft: &AnswerDraft) -> String {
    format!(
        "Claim:\n{}\n\nAnswer under review (conclusion: {}, confidence: {:.2}):\n{}",
        query, draft.conclusion, draft.confidence, draft.text
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
