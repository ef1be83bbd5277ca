//! Run-scoped accumulator.
//!
//! Stages never mutate the state directly. Each returns a [`StateUpdate`],
//! and the orchestrator folds updates in with [`RunState::apply`] at a point
//! where nothing else is running. Concurrent collectors therefore only ever
//! touch the state after the join, in registration order.

use serde::{Deserialize, Serialize};

use crate::evidence::{Evidence, EvidenceSet};
use crate::hypothesis::Hypothesis;
use crate::plan::Plan;
use crate::timeline::Timeline;
use crate::verify::Verification;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub plan: Option<Plan>,
    pub evidence: EvidenceSet,
    pub timeline: Timeline,
    pub hypotheses: Vec<Hypothesis>,
    pub verification: Verification,
    pub error_log: Vec<String>,
}

/// A stage's contribution to the run state.
///
/// Reduction per field: `evidence` and `errors` are concatenated (evidence
/// per category); every other field replaces the current value when set.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub plan: Option<Plan>,
    pub evidence: Vec<Evidence>,
    pub timeline: Option<Timeline>,
    pub hypotheses: Option<Vec<Hypothesis>>,
    pub verification: Option<Verification>,
    pub errors: Vec<String>,
}

impl StateUpdate {
    pub fn plan(plan: Plan) -> Self {
        Self {
            plan: Some(plan),
            ..Self::default()
        }
    }

    pub fn evidence(items: Vec<Evidence>) -> Self {
        Self {
            evidence: items,
            ..Self::default()
        }
    }

    pub fn timeline(timeline: Timeline) -> Self {
        Self {
            timeline: Some(timeline),
            ..Self::default()
        }
    }

    pub fn hypotheses(hypotheses: Vec<Hypothesis>) -> Self {
        Self {
            hypotheses: Some(hypotheses),
            ..Self::default()
        }
    }

    pub fn verification(verification: Verification) -> Self {
        Self {
            verification: Some(verification),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn with_errors(mut self, errors: impl IntoIterator<Item = String>) -> Self {
        self.errors.extend(errors);
        self
    }
}

impl RunState {
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(plan) = update.plan {
            self.plan = Some(plan);
        }
        self.evidence.extend(update.evidence);
        if let Some(timeline) = update.timeline {
            self.timeline = timeline;
        }
        if let Some(hypotheses) = update.hypotheses {
            self.hypotheses = hypotheses;
        }
        if let Some(verification) = update.verification {
            self.verification = verification;
        }
        self.error_log.extend(update.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Source;

    fn log(content: &str) -> Evidence {
        Evidence::new(Source::Log, content, "", 0.5)
    }

    #[test]
    fn test_evidence_and_errors_concatenate() {
        let mut state = RunState::default();
        state.apply(StateUpdate::evidence(vec![log("a")]).with_errors(["first".to_string()]));
        state.apply(StateUpdate::evidence(vec![
            log("b"),
            Evidence::new(Source::Historical, "h", "", 0.9),
        ]));
        state.apply(StateUpdate::error("second"));

        let logs: Vec<&str> = state.evidence.get(Source::Log).iter().map(|e| e.content()).collect();
        assert_eq!(logs, vec!["a", "b"]);
        assert_eq!(state.evidence.get(Source::Historical).len(), 1);
        assert_eq!(state.error_log, vec!["first", "second"]);
    }

    #[test]
    fn test_single_fields_replace() {
        let mut state = RunState::default();
        state.apply(StateUpdate::hypotheses(vec![Hypothesis::new("H1", "a", 0.5)]));
        state.apply(StateUpdate::hypotheses(vec![Hypothesis::new("H2", "b", 0.5)]));
        assert_eq!(state.hypotheses.len(), 1);
        assert_eq!(state.hypotheses[0].id, "H2");

        // an update without the field leaves it alone
        state.apply(StateUpdate::error("x"));
        assert_eq!(state.hypotheses[0].id, "H2");
    }
}
