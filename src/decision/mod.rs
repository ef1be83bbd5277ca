//! The decision gate: maps verification outcomes to answer / refuse /
//! request-more-data.
//!
//! Rules, in priority order:
//! 1. overall confidence ≥ `thresholds.confidence` and something is
//!    supported → answer
//! 2. overall confidence ≥ `thresholds.request_more_data` and the timeline
//!    reports gaps → request more data
//! 3. otherwise → refuse
//!
//! Everything here is a pure function of its inputs and the threshold
//! snapshot it was built with.

pub mod actions;
pub mod render;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::evidence::Source;
use crate::hypothesis::Hypothesis;
use crate::timeline::Timeline;
use crate::verify::{Verdict, Verification, VerificationResult};

use self::render::dedup_limit;

const MAX_ALTERNATIVES: usize = 2;
const MAX_LISTED: usize = 5;
const KNOWN_PER_SOURCE: usize = 2;
const TAKE_FROM_EACH: usize = 3;

pub const REFUSAL_REASON: &str = "Insufficient corroborating evidence for confident diagnosis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Answer,
    Refuse,
    RequestMoreData,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Answer => "answer",
            DecisionKind::Refuse => "refuse",
            DecisionKind::RequestMoreData => "request_more_data",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub hypothesis: String,
    pub why_less_likely: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub root_cause: String,
    pub confidence: f64,
    /// One representative snippet per category, or an item count.
    pub evidence: BTreeMap<Source, String>,
    pub timeline: String,
    pub recommended_actions: Vec<String>,
    pub alternative_hypotheses: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refusal {
    pub reason: String,
    pub confidence: f64,
    pub what_we_know: Vec<String>,
    pub missing_evidence: Vec<String>,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    pub current_confidence: f64,
    pub leading_hypothesis: String,
    pub needed_data: Vec<String>,
    pub why_needed: String,
}

/// Terminal output of a run. Exactly one variant per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Answer(Answer),
    Refuse(Refusal),
    RequestMoreData(DataRequest),
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Answer(_) => DecisionKind::Answer,
            Decision::Refuse(_) => DecisionKind::Refuse,
            Decision::RequestMoreData(_) => DecisionKind::RequestMoreData,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Decision::Answer(a) => a.confidence,
            Decision::Refuse(r) => r.confidence,
            Decision::RequestMoreData(d) => d.current_confidence,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionGate {
    thresholds: ThresholdConfig,
}

impl DecisionGate {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn decide(
        &self,
        verification: &Verification,
        hypotheses: &[Hypothesis],
        timeline: &Timeline,
    ) -> Decision {
        let overall = verification.overall_confidence;

        if overall >= self.thresholds.confidence {
            if let Some(best) = best_supported(verification) {
                return Decision::Answer(answer(best, verification, hypotheses, timeline, overall));
            }
        }

        if overall >= self.thresholds.request_more_data && !timeline.gaps.is_empty() {
            return Decision::RequestMoreData(request_more_data(hypotheses, &timeline.gaps, overall));
        }

        Decision::Refuse(refuse(verification, &timeline.gaps, overall))
    }
}

/// Highest-confidence supported result; the first one wins ties.
fn best_supported(verification: &Verification) -> Option<&VerificationResult> {
    verification.supported().fold(None, |best, r| match best {
        Some(b) if b.confidence >= r.confidence => Some(b),
        _ => Some(r),
    })
}

fn answer(
    best: &VerificationResult,
    verification: &Verification,
    hypotheses: &[Hypothesis],
    timeline: &Timeline,
    confidence: f64,
) -> Answer {
    let root_cause = hypotheses
        .iter()
        .find(|h| h.id == best.hypothesis_id)
        .map(|h| h.root_cause.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let evidence = best
        .evidence_summary
        .iter()
        .filter_map(|(source, items)| match items.as_slice() {
            [] => None,
            [only] => Some((*source, only.clone())),
            many => Some((*source, format!("{} pieces of evidence", many.len()))),
        })
        .collect();

    let alternative_hypotheses = verification
        .results
        .iter()
        .filter(|r| r.hypothesis_id != best.hypothesis_id && r.verdict != Verdict::Supported)
        .filter_map(|r| {
            hypotheses
                .iter()
                .find(|h| h.id == r.hypothesis_id)
                .map(|h| Alternative {
                    hypothesis: h.root_cause.clone(),
                    why_less_likely: r.reasoning.clone(),
                })
        })
        .take(MAX_ALTERNATIVES)
        .collect();

    Answer {
        recommended_actions: actions::recommend(&root_cause),
        root_cause,
        confidence,
        evidence,
        timeline: render::timeline(&timeline.events),
        alternative_hypotheses,
    }
}

fn refuse(verification: &Verification, gaps: &[String], confidence: f64) -> Refusal {
    let known = verification.results.iter().flat_map(|r| {
        r.evidence_summary
            .values()
            .flat_map(|items| items.iter().take(KNOWN_PER_SOURCE).cloned())
    });
    let what_we_know = dedup_limit(known, MAX_LISTED);

    let from_reasoning = verification
        .results
        .iter()
        .filter(|r| {
            r.verdict == Verdict::InsufficientEvidence && r.reasoning.to_lowercase().contains("missing")
        })
        .map(|r| r.reasoning.clone());
    let missing_evidence = dedup_limit(
        from_reasoning.chain(gaps.iter().take(TAKE_FROM_EACH).cloned()),
        MAX_LISTED,
    );

    let suggestion = if missing_evidence.is_empty() {
        "Additional data needed for confident root cause determination".to_string()
    } else {
        let first: Vec<&str> = missing_evidence.iter().take(2).map(String::as_str).collect();
        format!("Please provide {} for accurate analysis", first.join(", "))
    };

    Refusal {
        reason: REFUSAL_REASON.to_string(),
        confidence,
        what_we_know,
        missing_evidence,
        suggestion,
    }
}

fn request_more_data(hypotheses: &[Hypothesis], gaps: &[String], confidence: f64) -> DataRequest {
    // Most plausible, not most verified: this is where the evidence points.
    let leading = hypotheses.iter().fold(None::<&Hypothesis>, |best, h| match best {
        Some(b) if b.plausibility >= h.plausibility => Some(b),
        _ => Some(h),
    });

    let required = leading
        .map(|h| h.required_evidence.iter().take(TAKE_FROM_EACH).cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    let needed_data = dedup_limit(
        required.into_iter().chain(gaps.iter().take(TAKE_FROM_EACH).cloned()),
        MAX_LISTED,
    );

    let (leading_hypothesis, why_needed) = match leading {
        Some(h) => (
            h.root_cause.clone(),
            format!(
                "Current evidence suggests {}, but lacks direct confirmation",
                h.root_cause.to_lowercase()
            ),
        ),
        None => (
            "Unknown".to_string(),
            "Unable to determine root cause with current data".to_string(),
        ),
    };

    DataRequest {
        current_confidence: confidence,
        leading_hypothesis,
        needed_data,
        why_needed,
    }
}
