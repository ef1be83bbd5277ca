//! Candidate root causes and the generator seam.

pub mod rules;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::evidence::{clamp_unit, EvidenceSet};
use crate::timeline::{Correlation, Timeline};

pub use self::rules::RuleBasedGenerator;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("hypothesis generator unavailable: {0}")]
    Unavailable(String),
    #[error("hypothesis generator returned malformed output: {0}")]
    Malformed(String),
}

/// A candidate root-cause explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub root_cause: String,
    pub plausibility: f64,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default)]
    pub required_evidence: Vec<String>,
    #[serde(default)]
    pub would_refute: Vec<String>,
}

impl Hypothesis {
    pub fn new(id: impl Into<String>, root_cause: impl Into<String>, plausibility: f64) -> Self {
        Self {
            id: id.into(),
            root_cause: root_cause.into(),
            plausibility: clamp_unit(plausibility),
            supporting_evidence: Vec::new(),
            required_evidence: Vec::new(),
            would_refute: Vec::new(),
        }
    }

    pub fn supported_by<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.supporting_evidence = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn requires<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.required_evidence = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn refuted_by<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.would_refute = items.into_iter().map(Into::into).collect();
        self
    }
}

/// Produces hypotheses from the correlated timeline and collected evidence.
#[async_trait::async_trait]
pub trait HypothesisGenerator: Send + Sync {
    async fn generate(
        &self,
        timeline: &Timeline,
        correlations: &[Correlation],
        evidence: &EvidenceSet,
    ) -> Result<Vec<Hypothesis>, GenerateError>;
}

/// Coerce generator output into something the verifier can trust:
/// plausibility clamped, blank root causes and blank refutation phrases
/// dropped, repeated ids dropped (first wins). Survivors are ranked by
/// plausibility (stable, so ties keep generator order) and capped at `max`.
pub fn sanitize(raw: Vec<Hypothesis>, max: usize) -> (Vec<Hypothesis>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(raw.len());
    let mut dropped = Vec::new();

    for mut h in raw {
        h.id = h.id.trim().to_string();
        if h.root_cause.trim().is_empty() {
            dropped.push(format!("hypothesis '{}' dropped: empty root cause", h.id));
            continue;
        }
        if h.id.is_empty() || !seen.insert(h.id.clone()) {
            dropped.push(format!("hypothesis '{}' dropped: missing or duplicate id", h.id));
            continue;
        }
        h.plausibility = clamp_unit(h.plausibility);
        h.would_refute.retain(|p| !p.trim().is_empty());
        kept.push(h);
    }

    kept.sort_by(|a, b| b.plausibility.total_cmp(&a.plausibility));
    if kept.len() > max {
        debug!(generated = kept.len(), max, "hypothesis list capped");
        kept.truncate(max);
    }

    (kept, dropped)
}
