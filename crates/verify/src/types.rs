//! Types flowing through the verification pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use verity_knowledge::{Chunk, SourceType};

/// Which sources contributed to a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    LocalOnly,
    Hybrid,
    WebOnly,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::LocalOnly => "local_only",
            SearchSource::Hybrid => "hybrid",
            SearchSource::WebOnly => "web_only",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked piece of evidence for a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub chunk_id: String,

    /// Similarity to the query in [0, 1]
    pub similarity_score: f32,

    /// 1-based position in the result
    pub rank: usize,
}

/// Ranked evidence for one query plus the chunks it refers to.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Ordered by descending score, then recency, then insertion order
    pub documents: Vec<ScoredDocument>,

    /// Chunk content keyed by chunk id, one entry per document
    pub chunks: HashMap<String, Chunk>,

    pub search_source: SearchSource,

    /// Local documents above the relevance floor
    pub local_count: usize,

    /// Web documents in the result
    pub web_count: usize,

    /// A web search was wanted but failed or timed out
    pub web_degraded: bool,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.chunks.get(chunk_id)
    }

    /// Documents paired with their chunk, in rank order.
    pub fn evidence(&self) -> impl Iterator<Item = (&ScoredDocument, &Chunk)> {
        self.documents
            .iter()
            .filter_map(|doc| self.chunks.get(&doc.chunk_id).map(|chunk| (doc, chunk)))
    }

    pub fn mean_score(&self) -> f32 {
        if self.documents.is_empty() {
            return 0.0;
        }
        let total: f32 = self.documents.iter().map(|d| d.similarity_score).sum();
        total / self.documents.len() as f32
    }
}

/// A piece of evidence as presented to the reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceItem {
    /// Number used for `[n]` citation markers
    pub label: usize,
    pub chunk_id: String,
    pub text: String,
    pub source_type: SourceType,
    pub source_locator: String,
    pub score: f32,
}

impl EvidenceItem {
    pub fn from_chunk(label: usize, chunk: &Chunk, score: f32) -> Self {
        Self {
            label,
            chunk_id: chunk.id.clone(),
            text: chunk.text.clone(),
            source_type: chunk.source_type,
            source_locator: chunk.source_locator.clone(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceVerdict {
    pub sufficient: bool,
    pub rationale: String,
}

/// Overall judgement of the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    True,
    False,
    PartiallyTrue,
    Insufficient,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::True => "true",
            Conclusion::False => "false",
            Conclusion::PartiallyTrue => "partially_true",
            Conclusion::Insufficient => "insufficient",
        }
    }

    /// Parse a conclusion label such as `TRUE` or `Partially true`.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label
            .trim()
            .trim_matches(|c: char| c == '*' || c == '.' || c == '"')
            .to_uppercase()
            .replace(['_', '-'], " ");
        match normalized.as_str() {
            "TRUE" => Some(Conclusion::True),
            "FALSE" => Some(Conclusion::False),
            "PARTIALLY TRUE" | "PARTIAL" => Some(Conclusion::PartiallyTrue),
            "INSUFFICIENT" | "INSUFFICIENT EVIDENCE" | "UNVERIFIABLE" => {
                Some(Conclusion::Insufficient)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw answer as produced by the reasoning service, before citation checks.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    /// Answer text with `[n]` markers referring to evidence labels
    pub text: String,
    pub conclusion: Conclusion,

    /// Self-reported confidence, if the model gave one
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDraft {
    /// Answer text; marker `[i]` refers to `citations[i - 1]`
    pub text: String,

    /// Cited chunk ids in order of first use
    pub citations: Vec<String>,

    /// In [0, 1]
    pub confidence: f32,
    pub conclusion: Conclusion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub approved: bool,
    pub revised_text: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Done,
    Failed,
}

/// A cited chunk with enough provenance for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source_type: SourceType,
    pub source_locator: String,
}

/// Policy outcomes worth surfacing next to the answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeFlags {
    /// Evidence was still insufficient after the retrieval retries
    pub low_confidence: bool,
    pub evidence_budget_exhausted: bool,
    pub safety_budget_exhausted: bool,

    /// The answer is the fixed refusal, not a synthesized draft
    pub safe_refusal: bool,
    pub web_search_degraded: bool,
}

/// Result of one `verify` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub query_id: String,
    pub status: VerificationStatus,
    pub answer_text: String,
    pub citations: Vec<Citation>,

    /// None when the query failed before retrieval completed
    pub search_source: Option<SearchSource>,
    pub confidence: f32,
    pub local_count: usize,
    pub web_count: usize,
    pub conclusion: Conclusion,
    pub flags: OutcomeFlags,
    pub retrieve_attempts: u32,
    pub answer_attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationOutcome {
    pub fn is_done(&self) -> bool {
        self.status == VerificationStatus::Done
    }
}
