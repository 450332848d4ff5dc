//! Parsing of line-oriented reasoning replies.
//!
//! Replies look like `DECISION: SUFFICIENT` followed by further labelled
//! lines. A label may be decorated with list markers or bold markup, and its
//! value may continue over following unlabelled lines.

use crate::types::{Conclusion, EvidenceVerdict, GeneratedAnswer, SafetyVerdict};
use std::collections::HashMap;
use verity_core::{AppError, AppResult};

const LABELS: [&str; 7] = [
    "DECISION",
    "RATIONALE",
    "CONFIDENCE",
    "CONCLUSION",
    "ANSWER",
    "REASON",
    "REVISED",
];

#[derive(Debug, Default)]
struct Sections {
    /// Text before the first label
    preamble: String,
    fields: HashMap<&'static str, String>,
}

impl Sections {
    fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .get(label)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Split a line into a known label and the rest, if it starts with one.
fn split_label(line: &str) -> Option<(&'static str, &str)> {
    let stripped = line.trim_start_matches(|c: char| c.is_whitespace() || "-*#>".contains(c));
    let (head, rest) = stripped.split_once(':')?;
    let head = head.trim().trim_end_matches('*').trim().to_uppercase();
    let label = LABELS.iter().find(|l| **l == head)?;
    Some((label, rest.trim_start_matches('*').trim()))
}

fn sections(raw: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current: Option<&'static str> = None;

    for line in raw.lines() {
        if let Some((label, value)) = split_label(line) {
            // Repeated labels keep the first value.
            if sections.fields.contains_key(label) {
                current = None;
                continue;
            }
            sections.fields.insert(label, value.to_string());
            current = Some(label);
            continue;
        }

        let target = match current {
            Some(label) => sections.fields.entry(label).or_default(),
            None => &mut sections.preamble,
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(line);
    }

    sections
}

fn malformed(what: &str, raw: &str) -> AppError {
    let excerpt: String = raw.chars().take(120).collect();
    AppError::UnrecoverableState(format!("Malformed {} reply: {:?}", what, excerpt))
}

/// Parse `DECISION: SUFFICIENT|INSUFFICIENT` plus an optional rationale.
///
/// A `CONTRADICTORY` decision counts as sufficient: the evidence addresses
/// the claim even if it disagrees with it.
pub fn parse_evidence_verdict(raw: &str) -> AppResult<EvidenceVerdict> {
    let sections = sections(raw);
    let decision = sections
        .get("DECISION")
        .ok_or_else(|| malformed("evidence", raw))?
        .to_uppercase();

    let sufficient = if decision.contains("INSUFFICIENT") {
        false
    } else if decision.contains("SUFFICIENT") || decision.contains("CONTRADICTORY") {
        true
    } else {
        return Err(malformed("evidence", raw));
    };

    Ok(EvidenceVerdict {
        sufficient,
        rationale: sections.get("RATIONALE").unwrap_or_default().to_string(),
    })
}

/// Parse a synthesized answer.
///
/// Without an `ANSWER:` label the unlabelled text is taken as the answer.
/// A missing conclusion reads as insufficient.
pub fn parse_answer(raw: &str) -> AppResult<GeneratedAnswer> {
    let sections = sections(raw);

    let text = sections
        .get("ANSWER")
        .or_else(|| Some(sections.preamble.trim()).filter(|p| !p.is_empty()))
        .ok_or_else(|| malformed("answer", raw))?
        .to_string();

    let conclusion = sections
        .get("CONCLUSION")
        .and_then(Conclusion::parse)
        .unwrap_or(Conclusion::Insufficient);

    let confidence = sections.get("CONFIDENCE").and_then(parse_confidence);

    Ok(GeneratedAnswer {
        text,
        conclusion,
        confidence,
    })
}

/// Parse `DECISION: APPROVE|MODIFY|REJECT` with reason and revision.
pub fn parse_safety_verdict(raw: &str) -> AppResult<SafetyVerdict> {
    let sections = sections(raw);
    let decision = sections
        .get("DECISION")
        .ok_or_else(|| malformed("safety", raw))?
        .to_uppercase();

    let (approved, modify) = if decision.starts_with("APPROVE") {
        (true, false)
    } else if decision.starts_with("MODIFY") {
        (false, true)
    } else if decision.starts_with("REJECT") {
        (false, false)
    } else {
        return Err(malformed("safety", raw));
    };

    // Only a modification carries a replacement answer.
    let revised_text = sections
        .get("REVISED")
        .filter(|text| modify && !is_placeholder(text))
        .map(str::to_string);

    Ok(SafetyVerdict {
        approved,
        revised_text,
        reason: sections.get("REASON").unwrap_or_default().to_string(),
    })
}

/// `N/A`, `none`, `-` and the like stand for an absent value.
fn is_placeholder(value: &str) -> bool {
    let normalized = value
        .trim_matches(|c: char| c.is_whitespace() || "()[]*.\"'`".contains(c))
        .to_lowercase();
    matches!(
        normalized.as_str(),
        "" | "-" | "--" | "n/a" | "na" | "none" | "null" | "nil" | "not applicable"
    )
}

/// Accepts `0.8`, `80%` and `80`.
fn parse_confidence(value: &str) -> Option<f32> {
    let token = value.split_whitespace().next()?;
    let percent = token.ends_with('%');
    let number: f32 = token.trim_end_matches(['%', '.', ',']).parse().ok()?;
    let scaled = if percent || number > 1.0 {
        number / 100.0
    } else {
        number
    };
    scaled.is_finite().then(|| scaled.clamp(0.0, 1.0))
}
