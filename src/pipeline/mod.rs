//! The orchestrator: plan → collect → correlate → hypothesize → verify →
//! decide.
//!
//! A run never fails. Planner, collector and generator errors are written
//! to the error log and the run continues with whatever it has; the worst
//! case is a low-confidence refusal.

pub mod state;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collect::{
    CollectContext, CollectError, Collector, KnowledgeBase, KnowledgeCollector, LogRecord,
    LogRecordCollector,
};
use crate::config::PipelineConfig;
use crate::decision::{Decision, DecisionGate};
use crate::evidence::{Evidence, Source};
use crate::hypothesis::{sanitize, HypothesisGenerator, RuleBasedGenerator};
use crate::plan::{Plan, Planner, RulePlanner};
use crate::timeline::TimelineCorrelator;
use crate::verify::EvidenceVerifier;

pub use self::state::{RunState, StateUpdate};

/// Input to one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRequest {
    pub query: String,
    /// Incident time, ISO-8601 when known.
    pub timestamp: Option<String>,
    /// Dashboard screenshots or other image references for image collectors.
    pub image_refs: Vec<String>,
    pub log_records: Vec<LogRecord>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    TimedOut,
}

/// One stage (or collector) as it finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub agent: String,
    /// Evidence category, for collector entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub status: StageStatus,
    pub items: usize,
}

impl TraceEntry {
    fn new(agent: impl Into<String>, status: StageStatus, items: usize) -> Self {
        Self {
            agent: agent.into(),
            source: None,
            status,
            items,
        }
    }

    fn collector(collector: &dyn Collector, status: StageStatus, items: usize) -> Self {
        Self {
            source: Some(collector.source()),
            ..Self::new(collector.name(), status, items)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub run_id: Uuid,
    pub decision: Decision,
    pub overall_confidence: f64,
    pub error_log: Vec<String>,
    /// Diagnostic only. Collector entries appear in completion order, which
    /// varies between runs.
    pub trace: Vec<TraceEntry>,
    pub state: RunState,
}

/// Owns the collaborators and the live configuration. Runs share nothing
/// else; each one works from a snapshot of the configuration taken when it
/// starts.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    collectors: Vec<Arc<dyn Collector>>,
    generator: Arc<dyn HypothesisGenerator>,
    config: RwLock<PipelineConfig>,
}

impl Orchestrator {
    /// Rule planner and generator, no collectors.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            planner: Arc::new(RulePlanner),
            collectors: Vec::new(),
            generator: Arc::new(RuleBasedGenerator),
            config: RwLock::new(config),
        }
    }

    /// Built-in collaborators: rule planner, log search, knowledge search,
    /// rule-based generator.
    pub fn standard(config: PipelineConfig, knowledge: KnowledgeBase) -> Self {
        Self::new(config)
            .with_collector(LogRecordCollector)
            .with_collector(KnowledgeCollector::new(knowledge))
    }

    pub fn with_planner(mut self, planner: impl Planner + 'static) -> Self {
        self.planner = Arc::new(planner);
        self
    }

    /// Collectors are merged in the order they are registered.
    pub fn with_collector(mut self, collector: impl Collector + 'static) -> Self {
        self.collectors.push(Arc::new(collector));
        self
    }

    pub fn with_generator(mut self, generator: impl HypothesisGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub async fn config(&self) -> PipelineConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration. Runs already in flight keep their snapshot.
    pub async fn update_config(&self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        *self.config.write().await = config;
        info!("pipeline configuration updated");
        Ok(())
    }

    pub async fn run(&self, request: AnalysisRequest) -> AnalysisOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("analysis", %run_id);
        self.execute(run_id, request).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, request: AnalysisRequest) -> AnalysisOutcome {
        let config = self.config().await;
        let mut state = RunState::default();
        let mut trace = Vec::new();

        info!(query = %request.query, collectors = self.collectors.len(), "analysis started");

        // 1. Plan
        let plan = match self.planner.plan(&request).await {
            Ok(plan) => {
                info!(
                    priority = %plan.priority,
                    services = plan.affected_services.len(),
                    symptoms = plan.symptoms.len(),
                    "plan ready"
                );
                trace.push(TraceEntry::new("planner", StageStatus::Success, 1));
                plan
            }
            Err(e) => {
                warn!(error = %e, "planner failed, using fallback plan");
                trace.push(TraceEntry::new("planner", StageStatus::Failed, 0));
                state.apply(StateUpdate::error(format!("planner: {}", e)));
                Plan::fallback(&request)
            }
        };
        state.apply(StateUpdate::plan(plan.clone()));

        // 2. Collect
        let ctx = Arc::new(CollectContext { request, plan });
        for update in self.collect(ctx, &config, &mut trace).await {
            state.apply(update);
        }

        // 3. Correlate
        let timeline = TimelineCorrelator::new(config.correlation.clone()).build(&state.evidence.all());
        trace.push(TraceEntry::new("timeline", StageStatus::Success, timeline.len()));
        state.apply(StateUpdate::timeline(timeline));

        // 4. Hypothesize
        let generated = self
            .generator
            .generate(&state.timeline, &state.timeline.correlations, &state.evidence)
            .await;
        let update = match generated {
            Ok(raw) => {
                let (hypotheses, dropped) = sanitize(raw, config.hypotheses.max);
                trace.push(TraceEntry::new("hypothesis", StageStatus::Success, hypotheses.len()));
                StateUpdate::hypotheses(hypotheses).with_errors(dropped)
            }
            Err(e) => {
                warn!(error = %e, "hypothesis generation failed");
                trace.push(TraceEntry::new("hypothesis", StageStatus::Failed, 0));
                StateUpdate::hypotheses(Vec::new()).with_errors([format!("hypothesis: {}", e)])
            }
        };
        state.apply(update);

        // 5. Verify
        let verification = EvidenceVerifier::new().verify(&state.hypotheses, &state.evidence, &state.timeline);
        trace.push(TraceEntry::new("verifier", StageStatus::Success, verification.results.len()));
        state.apply(StateUpdate::verification(verification));

        // 6. Decide
        let decision = DecisionGate::new(config.thresholds.clone()).decide(
            &state.verification,
            &state.hypotheses,
            &state.timeline,
        );
        trace.push(TraceEntry::new("decision_gate", StageStatus::Success, 1));

        let overall_confidence = state.verification.overall_confidence;
        info!(
            decision = %decision.kind(),
            confidence = overall_confidence,
            evidence = state.evidence.len(),
            errors = state.error_log.len(),
            "analysis finished"
        );

        AnalysisOutcome {
            run_id,
            decision,
            overall_confidence,
            error_log: state.error_log.clone(),
            trace,
            state,
        }
    }

    /// Fan out every collector, join, and return one update per collector in
    /// registration order.
    async fn collect(
        &self,
        ctx: Arc<CollectContext>,
        config: &PipelineConfig,
        trace: &mut Vec<TraceEntry>,
    ) -> Vec<StateUpdate> {
        let per_collector = config.timeouts.collector();
        let deadline = tokio::time::Instant::now() + config.timeouts.pipeline();

        let mut set = JoinSet::new();
        for (idx, collector) in self.collectors.iter().enumerate() {
            let collector = Arc::clone(collector);
            let ctx = Arc::clone(&ctx);
            set.spawn(async move {
                let guarded = AssertUnwindSafe(collector.collect(&ctx)).catch_unwind();
                let result = match tokio::time::timeout(per_collector, guarded).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(CollectError::Panicked(panic_message(panic))),
                    Err(_) => Err(CollectError::Timeout(per_collector.as_secs())),
                };
                (idx, result)
            });
        }

        let mut outputs: Vec<Option<Result<Vec<Evidence>, CollectError>>> =
            self.collectors.iter().map(|_| None).collect();

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((idx, result)))) => {
                    let collector = self.collectors[idx].as_ref();
                    let name = collector.name();
                    let source = collector.source();
                    match &result {
                        Ok(items) => {
                            info!(collector = name, %source, items = items.len(), "collector finished");
                            trace.push(TraceEntry::collector(collector, StageStatus::Success, items.len()));
                        }
                        Err(e) => {
                            warn!(collector = name, %source, error = %e, "collector failed");
                            let status = match e {
                                CollectError::Timeout(_) => StageStatus::TimedOut,
                                _ => StageStatus::Failed,
                            };
                            trace.push(TraceEntry::collector(collector, status, 0));
                        }
                    }
                    outputs[idx] = Some(result);
                }
                Ok(Some(Err(join_err))) => {
                    // Tasks are only cancelled at the deadline, after this loop.
                    warn!(error = %join_err, "collector task ended abnormally");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = set.len(), "collection deadline reached, aborting remaining collectors");
                    set.abort_all();
                    break;
                }
            }
        }

        outputs
            .into_iter()
            .enumerate()
            .map(|(idx, output)| {
                let collector = self.collectors[idx].as_ref();
                let e = match output {
                    Some(Ok(items)) => return StateUpdate::evidence(items),
                    Some(Err(e)) => e,
                    None => {
                        trace.push(TraceEntry::collector(collector, StageStatus::TimedOut, 0));
                        CollectError::Timeout(config.timeouts.pipeline_secs)
                    }
                };
                StateUpdate::error(format!(
                    "{}: no {} evidence: {}",
                    collector.name(),
                    collector.source(),
                    e
                ))
            })
            .collect()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
