//! Evidence verification: the quality gate between hypotheses and answers.
//!
//! A hypothesis is only `Supported` when at least two independent evidence
//! categories back it, confidence clears 0.70, and nothing refutes it. Any
//! refutation hit makes it `Contradicted`, whatever the score.
//!
//! Matching is deliberately literal: key terms are substrings, refutations
//! are substrings. There is no semantic matching here.

pub mod terms;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evidence::{clamp_unit, Evidence, EvidenceSet, Source};
use crate::hypothesis::Hypothesis;
use crate::timeline::Timeline;

/// Confidence a hypothesis needs (together with two sources) to be supported.
pub const SUPPORT_THRESHOLD: f64 = 0.70;
/// Independent categories a hypothesis needs to be supported.
pub const MIN_INDEPENDENT_SOURCES: usize = 2;

const CONTRADICTION_PENALTY: f64 = 0.30;
const TIMELINE_PENALTY: f64 = 0.15;
const HISTORICAL_BONUS: f64 = 0.10;
const IMAGE_BONUS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Supported,
    InsufficientEvidence,
    Contradicted,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Supported => write!(f, "SUPPORTED"),
            Verdict::InsufficientEvidence => write!(f, "INSUFFICIENT_EVIDENCE"),
            Verdict::Contradicted => write!(f, "CONTRADICTED"),
        }
    }
}

/// Outcome of verifying one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub hypothesis_id: String,
    pub verdict: Verdict,
    pub confidence: f64,
    /// Matched snippets per category; every category is present.
    pub evidence_summary: BTreeMap<Source, Vec<String>>,
    pub independent_sources: usize,
    pub contradictions: Vec<String>,
    pub timeline_consistent: bool,
    pub reasoning: String,
}

impl VerificationResult {
    pub fn is_supported(&self) -> bool {
        self.verdict == Verdict::Supported
    }
}

/// All results of a verification pass plus the overall confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// One result per hypothesis, in the order the hypotheses were given.
    pub results: Vec<VerificationResult>,
    pub overall_confidence: f64,
}

impl Verification {
    pub fn get(&self, hypothesis_id: &str) -> Option<&VerificationResult> {
        self.results.iter().find(|r| r.hypothesis_id == hypothesis_id)
    }

    pub fn supported(&self) -> impl Iterator<Item = &VerificationResult> {
        self.results.iter().filter(|r| r.is_supported())
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Stateless verifier.
#[derive(Debug, Default, Clone)]
pub struct EvidenceVerifier;

impl EvidenceVerifier {
    pub fn new() -> Self {
        Self
    }

    pub fn verify(
        &self,
        hypotheses: &[Hypothesis],
        evidence: &EvidenceSet,
        timeline: &Timeline,
    ) -> Verification {
        let results: Vec<VerificationResult> = hypotheses
            .iter()
            .map(|h| self.verify_one(h, evidence, timeline))
            .collect();

        let overall_confidence = overall_confidence(&results);
        Verification {
            results,
            overall_confidence,
        }
    }

    pub fn verify_one(
        &self,
        hypothesis: &Hypothesis,
        evidence: &EvidenceSet,
        timeline: &Timeline,
    ) -> VerificationResult {
        let key_terms = terms::extract(&hypothesis.root_cause);

        let evidence_summary: BTreeMap<Source, Vec<String>> = Source::ALL
            .iter()
            .map(|&source| (source, supporting(&key_terms, evidence.get(source))))
            .collect();

        let independent_sources = evidence_summary.values().filter(|v| !v.is_empty()).count();

        let mut contradictions = refutation_hits(hypothesis, evidence);
        contradictions.extend(temporal_contradictions(hypothesis, timeline));

        let timeline_consistent = timeline.len() >= 2;

        let confidence = score(
            independent_sources,
            !contradictions.is_empty(),
            timeline_consistent,
            &evidence_summary,
        );
        let verdict = determine_verdict(confidence, independent_sources, !contradictions.is_empty());
        let reasoning = reasoning(
            verdict,
            confidence,
            independent_sources,
            &contradictions,
            timeline_consistent,
        );

        debug!(
            hypothesis = %hypothesis.id,
            %verdict,
            confidence,
            independent_sources,
            contradictions = contradictions.len(),
            "Hypothesis verified"
        );

        VerificationResult {
            hypothesis_id: hypothesis.id.clone(),
            verdict,
            confidence,
            evidence_summary,
            independent_sources,
            contradictions,
            timeline_consistent,
            reasoning,
        }
    }
}

fn supporting(key_terms: &[String], items: &[Evidence]) -> Vec<String> {
    items
        .iter()
        .filter(|ev| terms::supports(key_terms, ev.content()))
        .map(|ev| format!("{} (confidence: {:.2})", ev.content(), ev.confidence()))
        .collect()
}

/// Every `would_refute` phrase found in any evidence item, tagged with the
/// item's category.
fn refutation_hits(hypothesis: &Hypothesis, evidence: &EvidenceSet) -> Vec<String> {
    let phrases: Vec<String> = hypothesis
        .would_refute
        .iter()
        .map(|p| p.to_lowercase())
        .filter(|p| !p.trim().is_empty())
        .collect();

    let mut hits = Vec::new();
    for (source, items) in evidence.iter() {
        for ev in items {
            let content = ev.content().to_lowercase();
            for phrase in &phrases {
                if content.contains(phrase.as_str()) {
                    hits.push(format!("[{}] {}", source, ev.content()));
                }
            }
        }
    }
    hits
}

/// Causal-order contradictions ("X caused Y" while Y precedes X).
///
/// Not implemented: always empty. `timeline_consistent` is likewise only a
/// two-event check, not causal validation.
fn temporal_contradictions(_hypothesis: &Hypothesis, _timeline: &Timeline) -> Vec<String> {
    Vec::new()
}

/// Confidence from source diversity, penalties, and category bonuses.
pub fn score(
    independent_sources: usize,
    has_contradictions: bool,
    timeline_consistent: bool,
    evidence_summary: &BTreeMap<Source, Vec<String>>,
) -> f64 {
    let mut score = match independent_sources {
        0 => 0.20,
        1 => 0.40,
        2 => 0.70,
        _ => 0.85,
    };

    if has_contradictions {
        score -= CONTRADICTION_PENALTY;
    }
    if !timeline_consistent {
        score -= TIMELINE_PENALTY;
    }

    let has = |s: Source| evidence_summary.get(&s).is_some_and(|v| !v.is_empty());
    if has(Source::Historical) {
        score += HISTORICAL_BONUS;
    }
    if has(Source::Image) {
        score += IMAGE_BONUS;
    }

    clamp_unit(score)
}

/// The only place a verdict is decided.
pub fn determine_verdict(confidence: f64, independent_sources: usize, has_contradictions: bool) -> Verdict {
    if has_contradictions {
        Verdict::Contradicted
    } else if confidence >= SUPPORT_THRESHOLD && independent_sources >= MIN_INDEPENDENT_SOURCES {
        Verdict::Supported
    } else {
        Verdict::InsufficientEvidence
    }
}

fn reasoning(
    verdict: Verdict,
    confidence: f64,
    independent_sources: usize,
    contradictions: &[String],
    timeline_consistent: bool,
) -> String {
    match verdict {
        Verdict::Supported => {
            let mut text = format!(
                "Hypothesis supported with {} independent sources (confidence: {:.2}). ",
                independent_sources, confidence
            );
            if timeline_consistent {
                text.push_str("Timeline is consistent. ");
            } else {
                text.push_str("Minor timeline gaps but overall plausible. ");
            }
            text
        }
        Verdict::Contradicted => format!(
            "Hypothesis contradicted by evidence. Found {} contradictions: {}",
            contradictions.len(),
            contradictions
                .iter()
                .take(2)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Verdict::InsufficientEvidence => {
            let mut text = format!(
                "Insufficient evidence (only {} source(s), confidence: {:.2}). ",
                independent_sources, confidence
            );
            if independent_sources < MIN_INDEPENDENT_SOURCES {
                text.push_str("Need at least 2 independent sources for verification. ");
            }
            text
        }
    }
}

/// Best supported confidence, or the closest miss when nothing is supported.
fn overall_confidence(results: &[VerificationResult]) -> f64 {
    max_confidence(results.iter().filter(|r| r.is_supported()))
        .or_else(|| max_confidence(results.iter()))
        .unwrap_or(0.0)
}

fn max_confidence<'a>(results: impl Iterator<Item = &'a VerificationResult>) -> Option<f64> {
    results
        .map(|r| r.confidence)
        .fold(None, |acc, c| Some(acc.map_or(c, |a: f64| a.max(c))))
}
