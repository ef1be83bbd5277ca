//! Keyword-driven hypothesis generation used when no model is wired in.

use super::{GenerateError, Hypothesis, HypothesisGenerator};
use crate::evidence::EvidenceSet;
use crate::timeline::{Correlation, Timeline};

/// Minimum plausibility for a rule's hypothesis to be emitted.
const MIN_PLAUSIBILITY: f64 = 0.4;

/// Pattern flags extracted from the evidence.
#[derive(Debug, Default, Clone, Copy)]
struct Signals {
    deployment: bool,
    memory: bool,
    cpu_spike: bool,
    connection: bool,
    traffic: bool,
}

impl Signals {
    fn scan(timeline: &Timeline, evidence: &EvidenceSet) -> Self {
        let contents: Vec<String> = evidence
            .iter()
            .flat_map(|(_, items)| items.iter().map(|e| e.content().to_lowercase()))
            .collect();
        let any = |pred: &dyn Fn(&str) -> bool| contents.iter().any(|c| pred(c.as_str()));

        Self {
            deployment: timeline
                .events
                .iter()
                .any(|e| e.event.to_lowercase().contains("deploy")),
            memory: any(&|c| ["memory", "oom", "heap"].iter().any(|k| c.contains(k))),
            cpu_spike: any(&|c| {
                c.contains("cpu") && ["spike", "high", "95", "100"].iter().any(|k| c.contains(k))
            }),
            connection: any(&|c| c.contains("connection")),
            traffic: any(&|c| ["traffic", "requests", "load"].iter().any(|k| c.contains(k))),
        }
    }
}

/// Emits the fixed catalogue of incident hypotheses whose trigger
/// patterns appear in the evidence.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedGenerator;

impl RuleBasedGenerator {
    pub fn generate_sync(&self, timeline: &Timeline, evidence: &EvidenceSet) -> Vec<Hypothesis> {
        let s = Signals::scan(timeline, evidence);
        let mut out = Vec::new();

        if s.deployment && (s.memory || s.cpu_spike || s.connection) {
            out.push(
                Hypothesis::new("H1", "Issue introduced in recent deployment", 0.85)
                    .supported_by([
                        "Deployment timing correlates with symptom onset",
                        "Resource usage spike after deployment",
                    ])
                    .requires([
                        "Deployment logs with change details",
                        "Code diff of deployment",
                        "Resource metrics before/after deploy",
                    ])
                    .refuted_by([
                        "Issue started before deployment",
                        "No code changes in deployment",
                    ]),
            );
        }

        if s.memory {
            out.push(
                Hypothesis::new("H2", "Memory leak causing resource exhaustion", 0.80)
                    .supported_by(["OutOfMemoryError in logs", "Gradual memory increase visible"])
                    .requires(["Heap dump", "Memory usage metrics over time", "GC logs"])
                    .refuted_by([
                        "Memory usage remains stable",
                        "Issue occurs immediately, not gradually",
                    ]),
            );
        }

        if s.traffic || s.connection {
            let plausibility = if s.traffic { 0.60 } else { 0.50 };
            out.push(
                Hypothesis::new("H3", "Unexpected traffic spike overwhelming system", plausibility)
                    .supported_by(["Connection pool exhaustion", "Increased load visible"])
                    .requires([
                        "Request rate metrics",
                        "Load balancer logs",
                        "Connection pool metrics",
                    ])
                    .refuted_by([
                        "Request rate at normal levels",
                        "Connection pool size adequate for load",
                    ]),
            );
        }

        out.push(
            Hypothesis::new("H4", "External dependency failure or degradation", 0.50)
                .supported_by(["Timeout errors in logs"])
                .requires([
                    "External service status",
                    "Network latency metrics",
                    "Downstream service logs",
                ])
                .refuted_by(["All external services healthy", "No network issues detected"]),
        );

        out.push(
            Hypothesis::new("H5", "Recent configuration change causing issues", 0.45)
                .supported_by(["Symptom onset timing"])
                .requires([
                    "Configuration change history",
                    "Config diff",
                    "Rollback test results",
                ])
                .refuted_by([
                    "No config changes in timeframe",
                    "Config rollback doesn't resolve issue",
                ]),
        );

        out.retain(|h| h.plausibility > MIN_PLAUSIBILITY);

        if out.len() < 2 {
            out.push(
                Hypothesis::new(
                    format!("H{}", out.len() + 1),
                    "Unknown root cause - insufficient data",
                    0.3,
                )
                .requires(["Additional logs", "Metrics", "Timeline data"]),
            );
        }

        out
    }
}

#[async_trait::async_trait]
impl HypothesisGenerator for RuleBasedGenerator {
    async fn generate(
        &self,
        timeline: &Timeline,
        _correlations: &[Correlation],
        evidence: &EvidenceSet,
    ) -> Result<Vec<Hypothesis>, GenerateError> {
        Ok(self.generate_sync(timeline, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{Evidence, Source};
    use crate::timeline::TimelineCorrelator;

    fn build(items: Vec<Evidence>) -> (Timeline, EvidenceSet) {
        let timeline = TimelineCorrelator::default().build(&items);
        (timeline, items.into_iter().collect())
    }

    #[test]
    fn test_baseline_always_has_dependency_and_config() {
        let (tl, ev) = build(vec![]);
        let hs = RuleBasedGenerator.generate_sync(&tl, &ev);
        let ids: Vec<&str> = hs.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["H4", "H5"]);
    }

    #[test]
    fn test_deployment_with_memory() {
        let (tl, ev) = build(vec![
            Evidence::new(Source::Log, "Deployment v2.1.5 started", "2024-01-15T14:29:00Z", 0.95),
            Evidence::new(Source::Log, "OutOfMemoryError in ConnectionPool", "2024-01-15T14:31:45Z", 0.95),
        ]);
        let hs = RuleBasedGenerator.generate_sync(&tl, &ev);
        let ids: Vec<&str> = hs.iter().map(|h| h.id.as_str()).collect();
        // memory + connection trigger H1, H2 and H3 (connection only -> 0.50)
        assert_eq!(ids, vec!["H1", "H2", "H3", "H4", "H5"]);
        assert_eq!(hs[2].plausibility, 0.50);
    }

    #[tokio::test]
    async fn test_trait_impl() {
        let (tl, ev) = build(vec![Evidence::new(Source::Image, "Traffic surge", "", 0.9)]);
        let hs = RuleBasedGenerator.generate(&tl, &[], &ev).await.unwrap();
        assert_eq!(hs[0].id, "H3");
        assert_eq!(hs[0].plausibility, 0.60);
    }
}
