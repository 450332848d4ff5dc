//! Answer Synthesizer.
//!
//! Evidence goes to the reasoning service as numbered blocks and the reply
//! cites it with `[n]` markers. Markers are then checked against the evidence
//! that was actually offered: unknown numbers are stripped, valid ones become
//! chunk-id citations and are renumbered in order of first use, so marker
//! `[i]` in the draft always refers to `citations[i - 1]`.

use crate::deadline::{call_with_deadline, CancelToken};
use crate::reasoning::ReasoningService;
use crate::types::{AnswerDraft, Conclusion, EvidenceItem, RetrievalResult, SearchSource};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use verity_core::AppResult;
use verity_knowledge::SourceType;

/// Answer used when no evidence is eligible for citation.
pub const INSUFFICIENT_ANSWER: &str = "There is not enough reliable evidence to verify this \
claim. Consult primary sources or subject-matter experts for more precise information.";

/// Confidence ceiling when evidence stayed insufficient after retries.
const LOW_CONFIDENCE_CEILING: f32 = 0.5;

/// Confidence ceiling for an answer that cites nothing.
const UNCITED_CEILING: f32 = 0.3;

/// Bracketed numbers this far past the last label are ordinary text, not
/// citations (`[1932]`).
const MARKER_SLACK: usize = 10;

lazy_static! {
    /// `[3]` or `[1, 2]`
    static ref MARKER: Regex = Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").unwrap();
}

/// Which evidence may be cited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    All,
    WebOnly,
}

pub struct AnswerSynthesizer {
    reasoning: Arc<dyn ReasoningService>,
    timeout: Duration,
    prefer_web_for_hybrid: bool,
}

impl AnswerSynthesizer {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        timeout: Duration,
        prefer_web_for_hybrid: bool,
    ) -> Self {
        Self {
            reasoning,
            timeout,
            prefer_web_for_hybrid,
        }
    }

    /// Hybrid results cite only web evidence when freshness is preferred
    /// and web evidence exists.
    pub fn source_filter(&self, result: &RetrievalResult) -> SourceFilter {
        let has_web = result
            .evidence()
            .any(|(_, chunk)| chunk.source_type == SourceType::Web);
        if self.prefer_web_for_hybrid && result.search_source == SearchSource::Hybrid && has_web {
            SourceFilter::WebOnly
        } else {
            SourceFilter::All
        }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        result: &RetrievalResult,
        low_confidence: bool,
        cancel: &CancelToken,
    ) -> AppResult<AnswerDraft> {
        let filter = self.source_filter(result);
        let evidence = eligible_evidence(result, filter);

        if evidence.is_empty() {
            info!("No citable evidence; returning the insufficient-evidence answer");
            return Ok(AnswerDraft {
                text: INSUFFICIENT_ANSWER.to_string(),
                citations: Vec::new(),
                confidence: 0.0,
                conclusion: Conclusion::Insufficient,
            });
        }

        let generated = call_with_deadline(
            "reasoning",
            self.timeout,
            cancel,
            self.reasoning.synthesize_answer(query, &evidence, low_confidence),
        )
        .await?;

        let (text, citations) = resolve_citations(&generated.text, evidence.len(), |label| {
            evidence
                .iter()
                .find(|item| item.label == label)
                .map(|item| item.chunk_id.clone())
        });

        let cited_mean = mean_cited_score(&citations, &evidence);
        let mut confidence = generated.confidence.unwrap_or(cited_mean);
        if citations.is_empty() {
            confidence = confidence.min(UNCITED_CEILING);
        }
        if low_confidence {
            confidence = confidence.min(LOW_CONFIDENCE_CEILING);
        }

        info!(
            ?filter,
            conclusion = %generated.conclusion,
            citations = citations.len(),
            confidence,
            "Answer synthesized"
        );

        Ok(AnswerDraft {
            text,
            citations,
            confidence: confidence.clamp(0.0, 1.0),
            conclusion: generated.conclusion,
        })
    }
}

/// Evidence eligible under `filter`, in rank order, labelled from 1.
pub fn eligible_evidence(result: &RetrievalResult, filter: SourceFilter) -> Vec<EvidenceItem> {
    result
        .evidence()
        .filter(|(_, chunk)| filter == SourceFilter::All || chunk.source_type == SourceType::Web)
        .enumerate()
        .map(|(i, (doc, chunk))| EvidenceItem::from_chunk(i + 1, chunk, doc.similarity_score))
        .collect()
}

/// Rewrite `[n]` markers in `text`.
///
/// `lookup` maps a marker number to a chunk id, for labels `1..=label_count`.
/// Resolved markers are renumbered by first use; unresolved ones are removed.
/// Brackets holding a number well past `label_count` are left as written.
/// Returns the new text and the cited chunk ids in marker order.
pub fn resolve_citations<F>(text: &str, label_count: usize, lookup: F) -> (String, Vec<String>)
where
    F: Fn(usize) -> Option<String>,
{
    let mut citations: Vec<String> = Vec::new();
    let limit = label_count + MARKER_SLACK;

    let rewritten = MARKER.replace_all(text, |caps: &Captures| {
        let numbers: Option<Vec<usize>> = caps[1]
            .split(',')
            .map(|n| n.trim().parse::<usize>().ok())
            .collect();
        let Some(numbers) = numbers.filter(|ns| ns.iter().all(|n| *n <= limit)) else {
            return caps[0].to_string();
        };

        let mut labels = Vec::new();
        for number in numbers {
            let Some(chunk_id) = lookup(number) else {
                debug!(marker = number, "Dropping citation outside the evidence set");
                continue;
            };
            let position = match citations.iter().position(|c| *c == chunk_id) {
                Some(position) => position,
                None => {
                    citations.push(chunk_id);
                    citations.len() - 1
                }
            };
            let label = (position + 1).to_string();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        if labels.is_empty() {
            String::new()
        } else {
            format!("[{}]", labels.join(", "))
        }
    });

    (tidy_spacing(&rewritten), citations)
}

/// Remove gaps left by stripped markers.
fn tidy_spacing(text: &str) -> String {
    text.lines()
        .map(|line| {
            let collapsed = line
                .split(' ')
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            collapsed.replace(" .", ".").replace(" ,", ",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn mean_cited_score(citations: &[String], evidence: &[EvidenceItem]) -> f32 {
    let scores: Vec<f32> = citations
        .iter()
        .filter_map(|id| evidence.iter().find(|e| &e.chunk_id == id).map(|e| e.score))
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(text: &str, ids: &[&str]) -> (String, Vec<String>) {
        resolve_citations(text, ids.len(), |n| {
            n.checked_sub(1).and_then(|i| ids.get(i)).map(|s| s.to_string())
        })
    }

    #[test]
    fn test_valid_markers_become_citations() {
        let (text, citations) =
            resolve("Opened in 1889 [2]. Height is 330 m [1].", &["a", "b"]);
        assert_eq!(citations, vec!["b", "a"]);
        assert_eq!(text, "Opened in 1889 [1]. Height is 330 m [2].");
    }

    #[test]
    fn test_unknown_markers_are_stripped() {
        let (text, citations) =
            resolve("Claim holds [1]. Invented detail [7].", &["a"]);
        assert_eq!(citations, vec!["a"]);
        assert_eq!(text, "Claim holds [1]. Invented detail.");
    }

    #[test]
    fn test_grouped_markers_and_repeats() {
        let (text, citations) =
            resolve("Both agree [1, 3]. Again [3]. Bad [0].", &["a", "b", "c"]);
        assert_eq!(citations, vec!["a", "c"]);
        assert_eq!(text, "Both agree [1, 2]. Again [2]. Bad.");
    }

    #[test]
    fn test_text_without_markers_is_unchanged() {
        let (text, citations) = resolve("Nothing cited here.\nSecond line.", &[]);
        assert!(citations.is_empty());
        assert_eq!(text, "Nothing cited here.\nSecond line.");
    }

    #[test]
    fn test_bracketed_years_are_not_citations() {
        let (text, citations) = resolve(
            "Completed [1932] and reported [1]. See also [1, 1932].",
            &["a"],
        );
        assert_eq!(citations, vec!["a"]);
        assert_eq!(text, "Completed [1932] and reported [1]. See also [1, 1932].");
    }
}
