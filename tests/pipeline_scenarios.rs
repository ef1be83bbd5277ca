//! End-to-end pipeline scenarios with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use incidentgate::collect::{CollectContext, CollectError, Collector};
use incidentgate::config::PipelineConfig;
use incidentgate::decision::{Decision, DecisionKind};
use incidentgate::evidence::{Evidence, Source};
use incidentgate::hypothesis::{GenerateError, Hypothesis, HypothesisGenerator};
use incidentgate::pipeline::{AnalysisRequest, Orchestrator, StageStatus};
use incidentgate::plan::{Plan, PlanError, Planner};
use incidentgate::timeline::{Correlation, Timeline, TimelineCorrelator};
use incidentgate::verify::Verdict;
use incidentgate::EvidenceSet;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

struct Scripted {
    name: &'static str,
    source: Source,
    items: Vec<Evidence>,
    delay: Duration,
}

impl Scripted {
    fn new(name: &'static str, source: Source, items: Vec<Evidence>) -> Self {
        Self {
            name,
            source,
            items,
            delay: Duration::ZERO,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Collector for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn source(&self) -> Source {
        self.source
    }

    async fn collect(&self, _ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.items.clone())
    }
}

struct Failing;

#[async_trait::async_trait]
impl Collector for Failing {
    fn name(&self) -> &str {
        "metrics_query"
    }

    fn source(&self) -> Source {
        Source::Metrics
    }

    async fn collect(&self, _ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError> {
        Err(CollectError::Configuration("missing API token".to_string()))
    }
}

struct Panicking;

#[async_trait::async_trait]
impl Collector for Panicking {
    fn name(&self) -> &str {
        "image_analysis"
    }

    fn source(&self) -> Source {
        Source::Image
    }

    async fn collect(&self, _ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError> {
        panic!("vision backend exploded");
    }
}

/// Signals when it starts, then waits to be released.
struct Gated {
    started: Arc<Notify>,
    release: Arc<Notify>,
    items: Vec<Evidence>,
}

#[async_trait::async_trait]
impl Collector for Gated {
    fn name(&self) -> &str {
        "gated"
    }

    fn source(&self) -> Source {
        Source::Historical
    }

    async fn collect(&self, _ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.items.clone())
    }
}

struct FixedHypotheses(Vec<Hypothesis>);

#[async_trait::async_trait]
impl HypothesisGenerator for FixedHypotheses {
    async fn generate(
        &self,
        _timeline: &Timeline,
        _correlations: &[Correlation],
        _evidence: &EvidenceSet,
    ) -> Result<Vec<Hypothesis>, GenerateError> {
        Ok(self.0.clone())
    }
}

struct BrokenGenerator;

#[async_trait::async_trait]
impl HypothesisGenerator for BrokenGenerator {
    async fn generate(
        &self,
        _timeline: &Timeline,
        _correlations: &[Correlation],
        _evidence: &EvidenceSet,
    ) -> Result<Vec<Hypothesis>, GenerateError> {
        Err(GenerateError::Unavailable("model endpoint refused connection".to_string()))
    }
}

struct BrokenPlanner;

#[async_trait::async_trait]
impl Planner for BrokenPlanner {
    async fn plan(&self, _request: &AnalysisRequest) -> Result<Plan, PlanError> {
        Err(PlanError::Malformed("not json".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn memory_leak() -> Hypothesis {
    Hypothesis::new("H1", "Memory leak in pool", 0.8)
        .requires(["Heap dump", "GC logs"])
        .refuted_by(["memory stable"])
}

fn oom_log() -> Evidence {
    Evidence::new(Source::Log, "OutOfMemoryError in pool", "2024-01-15T14:31:45Z", 0.95)
}

fn incident() -> Evidence {
    Evidence::new(Source::Historical, "INC-089 memory leak", "", 0.9)
}

fn orchestrator(collectors: Vec<Scripted>) -> Orchestrator {
    collectors.into_iter().fold(
        Orchestrator::new(PipelineConfig::default()).with_generator(FixedHypotheses(vec![memory_leak()])),
        |orch, c| orch.with_collector(c),
    )
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        timestamp: Some("2024-01-15T14:32:00Z".to_string()),
        ..AnalysisRequest::new("payment api memory errors")
    }
}

fn fast_timeouts(collector_secs: u64, pipeline_secs: u64) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.timeouts.collector_secs = collector_secs;
    config.timeouts.pipeline_secs = pipeline_secs;
    config
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_corroborating_sources_answer() {
    let outcome = orchestrator(vec![
        Scripted::new("log_search", Source::Log, vec![oom_log()]),
        Scripted::new("knowledge_search", Source::Historical, vec![incident()]),
    ])
    .run(request())
    .await;

    let result = outcome.state.verification.get("H1").unwrap();
    assert_eq!(result.independent_sources, 2);
    assert!(result.contradictions.is_empty());
    assert!(result.confidence >= 0.70);
    assert_eq!(result.verdict, Verdict::Supported);

    let Decision::Answer(answer) = &outcome.decision else {
        panic!("expected answer, got {:?}", outcome.decision.kind());
    };
    assert_eq!(answer.root_cause, "Memory leak in pool");
    assert!(outcome.error_log.is_empty());
}

#[tokio::test]
async fn test_single_source_refuses() {
    let outcome = orchestrator(vec![Scripted::new("log_search", Source::Log, vec![oom_log()])])
        .run(request())
        .await;

    let result = outcome.state.verification.get("H1").unwrap();
    assert_eq!(result.independent_sources, 1);
    assert_eq!(result.verdict, Verdict::InsufficientEvidence);
    assert!(outcome.overall_confidence < 0.5);
    assert_eq!(outcome.decision.kind(), DecisionKind::Refuse);
}

#[tokio::test]
async fn test_refuting_phrase_contradicts() {
    let outcome = orchestrator(vec![
        Scripted::new("log_search", Source::Log, vec![oom_log()]),
        Scripted::new("knowledge_search", Source::Historical, vec![incident()]),
        Scripted::new(
            "dashboard",
            Source::Dashboard,
            vec![Evidence::new(Source::Dashboard, "Heap MEMORY STABLE at 40%", "", 0.9)],
        ),
    ])
    .run(request())
    .await;

    let result = outcome.state.verification.get("H1").unwrap();
    assert_eq!(result.verdict, Verdict::Contradicted);
    assert_eq!(result.contradictions, vec!["[dashboard] Heap MEMORY STABLE at 40%".to_string()]);
    assert_ne!(outcome.decision.kind(), DecisionKind::Answer);
}

#[test]
fn test_unrelated_events_do_not_correlate() {
    let correlator = TimelineCorrelator::default();

    let near = correlator.build(&[
        Evidence::new(Source::Image, "Pager acknowledged", "2024-01-15T14:00:00Z", 0.9),
        Evidence::new(Source::Log, "Disk nearly full", "2024-01-15T14:08:20Z", 0.9),
    ]);
    assert!(near.correlations.is_empty());
    assert!(!near.gaps.iter().any(|g| g.starts_with("Large time gap")));

    let far = correlator.build(&[
        Evidence::new(Source::Image, "Pager acknowledged", "2024-01-15T14:00:00Z", 0.9),
        Evidence::new(Source::Log, "Disk nearly full", "2024-01-15T14:11:40Z", 0.9),
    ]);
    assert!(far.correlations.is_empty());
    assert!(far.gaps.iter().any(|g| g.starts_with("Large time gap (11 minutes)")));
}

#[tokio::test]
async fn test_failing_collector_degrades() {
    let outcome = orchestrator(vec![
        Scripted::new("log_search", Source::Log, vec![oom_log()]),
        Scripted::new("knowledge_search", Source::Historical, vec![incident()]),
    ])
    .with_collector(Failing)
    .run(request())
    .await;

    assert!(outcome.state.evidence.get(Source::Metrics).is_empty());
    assert_eq!(outcome.error_log.len(), 1);
    assert!(outcome.error_log[0].starts_with("metrics_query: no metrics evidence:"));
    assert!(outcome.error_log[0].contains("missing API token"));
    let entry = outcome.trace.iter().find(|t| t.agent == "metrics_query").unwrap();
    assert_eq!(entry.status, StageStatus::Failed);
    assert_eq!(entry.source, Some(Source::Metrics));
    // the other two still carry the answer
    assert_eq!(outcome.decision.kind(), DecisionKind::Answer);
}

#[tokio::test]
async fn test_panicking_collector_is_contained() {
    let outcome = orchestrator(vec![Scripted::new("log_search", Source::Log, vec![oom_log()])])
        .with_collector(Panicking)
        .run(request())
        .await;

    assert!(outcome.state.evidence.get(Source::Image).is_empty());
    assert_eq!(outcome.state.evidence.get(Source::Log).len(), 1);
    assert!(outcome.error_log.iter().any(|e| e.contains("vision backend exploded")));
    let entry = outcome.trace.iter().find(|t| t.agent == "image_analysis").unwrap();
    assert_eq!(entry.status, StageStatus::Failed);
}

#[tokio::test]
async fn test_slow_collector_times_out() {
    let orch = Orchestrator::new(fast_timeouts(1, 30))
        .with_generator(FixedHypotheses(vec![memory_leak()]))
        .with_collector(Scripted::new("log_search", Source::Log, vec![oom_log()]))
        .with_collector(
            Scripted::new("slow_metrics", Source::Metrics, vec![oom_log()]).delayed(Duration::from_secs(30)),
        );

    let outcome = orch.run(request()).await;
    let entry = outcome.trace.iter().find(|t| t.agent == "slow_metrics").unwrap();
    assert_eq!(entry.status, StageStatus::TimedOut);
    assert!(outcome.error_log.iter().any(|e| e.starts_with("slow_metrics:")));
    assert_eq!(outcome.state.evidence.len(), 1);
}

#[tokio::test]
async fn test_pipeline_deadline_aborts_stragglers() {
    let orch = Orchestrator::new(fast_timeouts(30, 1))
        .with_generator(FixedHypotheses(vec![memory_leak()]))
        .with_collector(Scripted::new("log_search", Source::Log, vec![oom_log()]))
        .with_collector(
            Scripted::new("slow_metrics", Source::Metrics, vec![oom_log()]).delayed(Duration::from_secs(30)),
        );

    let started = std::time::Instant::now();
    let outcome = orch.run(request()).await;
    assert!(started.elapsed() < Duration::from_secs(10));

    let entry = outcome.trace.iter().find(|t| t.agent == "slow_metrics").unwrap();
    assert_eq!(entry.status, StageStatus::TimedOut);
    assert_eq!(entry.source, Some(Source::Metrics));
    assert!(outcome.error_log.iter().any(|e| e.starts_with("slow_metrics: no metrics evidence:")));
    assert_eq!(outcome.state.evidence.get(Source::Log).len(), 1);
}

#[tokio::test]
async fn test_generator_failure_refuses() {
    let outcome = Orchestrator::new(PipelineConfig::default())
        .with_generator(BrokenGenerator)
        .with_collector(Scripted::new("log_search", Source::Log, vec![oom_log()]))
        .run(request())
        .await;

    assert!(outcome.state.hypotheses.is_empty());
    assert!(outcome.error_log.iter().any(|e| e.contains("model endpoint refused connection")));
    assert_eq!(outcome.decision.kind(), DecisionKind::Refuse);
}

#[tokio::test]
async fn test_planner_failure_uses_fallback_plan() {
    let outcome = orchestrator(vec![Scripted::new("log_search", Source::Log, vec![oom_log()])])
        .with_planner(BrokenPlanner)
        .run(request())
        .await;

    let plan = outcome.state.plan.as_ref().unwrap();
    assert!(plan.affected_services.is_empty());
    assert_eq!(plan.incident_time, "2024-01-15T14:32:00Z");
    assert_eq!(outcome.trace[0].status, StageStatus::Failed);
    assert!(outcome.error_log[0].starts_with("planner:"));
}

#[tokio::test]
async fn test_malformed_hypotheses_are_coerced() {
    let mut wild = memory_leak();
    wild.plausibility = 4.2;
    let outcome = Orchestrator::new(PipelineConfig::default())
        .with_generator(FixedHypotheses(vec![
            wild,
            Hypothesis::new("H1", "Duplicate of the first", 0.9),
            Hypothesis::new("H2", "", 0.9),
        ]))
        .run(request())
        .await;

    assert_eq!(outcome.state.hypotheses.len(), 1);
    assert_eq!(outcome.state.hypotheses[0].plausibility, 1.0);
    assert_eq!(outcome.error_log.len(), 2);
}

#[tokio::test]
async fn test_hypotheses_ranked_and_capped() {
    let mut config = PipelineConfig::default();
    config.hypotheses.max = 3;
    let generated: Vec<Hypothesis> = [0.2, 0.9, 0.5, 0.7, 0.5, 0.3]
        .iter()
        .enumerate()
        .map(|(i, p)| Hypothesis::new(format!("H{}", i + 1), format!("Cause number {}", i + 1), *p))
        .collect();

    let outcome = Orchestrator::new(config)
        .with_generator(FixedHypotheses(generated))
        .run(request())
        .await;

    let ids: Vec<&str> = outcome.state.hypotheses.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["H2", "H4", "H3"]);
    let verified: Vec<&str> = outcome
        .state
        .verification
        .results
        .iter()
        .map(|r| r.hypothesis_id.as_str())
        .collect();
    assert_eq!(verified, ids);
    assert!(outcome.error_log.is_empty());
}

// ---------------------------------------------------------------------------
// Determinism and configuration snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_identical_inputs_identical_decision() {
    let build = || {
        orchestrator(vec![
            Scripted::new("log_search", Source::Log, vec![oom_log()]),
            Scripted::new("knowledge_search", Source::Historical, vec![incident()]),
        ])
    };
    let first = build().run(request()).await;
    let second = build().run(request()).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.decision, second.decision);
    assert_eq!(first.state.verification, second.state.verification);
}

#[tokio::test]
async fn test_completion_order_does_not_change_evidence() {
    let a = Evidence::new(Source::Log, "OutOfMemoryError in pool", "2024-01-15T14:31:45Z", 0.9);
    let b = Evidence::new(Source::Log, "pool memory climbing", "2024-01-15T14:30:00Z", 0.8);

    let run = |delay_first: Duration, delay_second: Duration| {
        let orch = orchestrator(vec![
            Scripted::new("first", Source::Log, vec![a.clone()]).delayed(delay_first),
            Scripted::new("second", Source::Log, vec![b.clone()]).delayed(delay_second),
        ]);
        async move { orch.run(request()).await }
    };

    let slow_first = run(Duration::from_millis(150), Duration::ZERO).await;
    let slow_second = run(Duration::ZERO, Duration::from_millis(150)).await;

    let contents = |o: &incidentgate::AnalysisOutcome| -> Vec<String> {
        o.state.evidence.get(Source::Log).iter().map(|e| e.content().to_string()).collect()
    };
    assert_eq!(contents(&slow_first), vec!["OutOfMemoryError in pool", "pool memory climbing"]);
    assert_eq!(contents(&slow_first), contents(&slow_second));
    assert_eq!(slow_first.decision, slow_second.decision);

    // the trace reflects completion order and is allowed to differ
    let collectors = |o: &incidentgate::AnalysisOutcome| -> Vec<String> {
        o.trace
            .iter()
            .filter(|t| t.agent == "first" || t.agent == "second")
            .map(|t| t.agent.clone())
            .collect()
    };
    assert_eq!(collectors(&slow_first), vec!["second", "first"]);
    assert_eq!(collectors(&slow_second), vec!["first", "second"]);
}

#[tokio::test]
async fn test_threshold_is_snapshotted_per_run() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let orch = Arc::new(
        Orchestrator::new(PipelineConfig::default())
            .with_generator(FixedHypotheses(vec![memory_leak()]))
            .with_collector(Scripted::new("log_search", Source::Log, vec![oom_log()]))
            .with_collector(Gated {
                started: Arc::clone(&started),
                release: Arc::clone(&release),
                items: vec![incident()],
            }),
    );

    let running = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run(request()).await })
    };

    started.notified().await;
    let mut strict = PipelineConfig::default();
    strict.thresholds.confidence = 0.95;
    orch.update_config(strict).await.unwrap();
    release.notify_one();

    let outcome = running.await.unwrap();
    // 0.80 clears the snapshot threshold (0.70) but not the updated one
    assert_eq!(outcome.decision.kind(), DecisionKind::Answer);

    // the next run sees the new threshold
    release.notify_one();
    let next = orch.run(request()).await;
    assert_ne!(next.decision.kind(), DecisionKind::Answer);
}
