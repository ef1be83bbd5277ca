//! Timeline correlation: turns heterogeneous evidence into an ordered
//! narrative, the temporal links inside it, and the holes around it.
//!
//! Every evidence item becomes exactly one [`TimelineEvent`]. Events are
//! ordered by parsed timestamp; events whose timestamp no layout accepts are
//! kept, in input order, after all the dated ones.

pub mod correlation;
pub mod timestamp;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CorrelationConfig;
use crate::evidence::{Evidence, Source};

pub use self::correlation::{Correlation, Strength};

/// Longest description kept verbatim before truncation.
const MAX_DESCRIPTION_CHARS: usize = 150;

/// Classification used by the causal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Deployment,
    MetricAnomaly,
    Error,
    Performance,
    Capacity,
    Configuration,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Deployment => "deployment",
            EventType::MetricAnomaly => "metric_anomaly",
            EventType::Error => "error",
            EventType::Performance => "performance",
            EventType::Capacity => "capacity",
            EventType::Configuration => "configuration",
            EventType::Other => "other",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rules, first match wins.
const CLASSIFICATION_RULES: [(EventType, &[&str]); 6] = [
    (EventType::Deployment, &["deploy", "deployment", "release"]),
    (EventType::MetricAnomaly, &["spike", "increase", "high", "drop", "low"]),
    (EventType::Error, &["error", "exception", "failure", "crash"]),
    (EventType::Performance, &["slow", "timeout", "latency"]),
    (EventType::Capacity, &["memory", "cpu", "disk", "connection"]),
    (EventType::Configuration, &["config", "setting", "update"]),
];

/// Classify evidence content by the fixed keyword priority list.
pub fn classify(content: &str) -> EventType {
    let lower = content.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(EventType::Other)
}

/// Concise description: truncated content, with the message after an
/// `ERROR:` / `CRITICAL:` marker pulled out for log evidence.
pub fn describe(evidence: &Evidence) -> String {
    let content = truncate_chars(evidence.content(), MAX_DESCRIPTION_CHARS);

    if evidence.source() == Source::Log {
        if content.contains("ERROR") {
            if let Some(msg) = content.split("ERROR:").nth(1) {
                return format!("Error: {}", msg.trim());
            }
        }
        if content.contains("CRITICAL") {
            if let Some(msg) = content.split("CRITICAL:").nth(1) {
                return format!("Critical: {}", msg.trim());
            }
        }
    }

    content
}

/// Truncate to `max` characters, marking the cut with `...`.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

/// One evidence item placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Raw timestamp as reported by the collector.
    pub time: String,
    pub event: String,
    pub source: Source,
    pub event_type: EventType,
    pub confidence: f64,
    /// Index of the originating item in the evidence slice the timeline was
    /// built from.
    pub evidence_index: usize,
}

impl TimelineEvent {
    pub fn is_dated(&self) -> bool {
        timestamp::parse(&self.time).is_some()
    }
}

/// Output of a correlation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub correlations: Vec<Correlation>,
    pub gaps: Vec<String>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Builds [`Timeline`]s. Holds only configuration; every call is pure.
#[derive(Debug, Clone, Default)]
pub struct TimelineCorrelator {
    config: CorrelationConfig,
}

impl TimelineCorrelator {
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, evidence: &[Evidence]) -> Timeline {
        let events = order_events(to_events(evidence));
        let correlations = correlation::find_correlations(&events, &self.config);
        let gaps = correlation::find_gaps(&events, &self.config);

        debug!(
            events = events.len(),
            correlations = correlations.len(),
            gaps = gaps.len(),
            "Timeline built"
        );

        Timeline {
            events,
            correlations,
            gaps,
        }
    }
}

fn to_events(evidence: &[Evidence]) -> Vec<TimelineEvent> {
    evidence
        .iter()
        .enumerate()
        .map(|(idx, ev)| TimelineEvent {
            time: ev.timestamp().to_string(),
            event: describe(ev),
            source: ev.source(),
            event_type: classify(ev.content()),
            confidence: ev.confidence(),
            evidence_index: idx,
        })
        .collect()
}

/// Dated events ascending (stable), then undated in input order.
fn order_events(events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    let (mut dated, undated): (Vec<_>, Vec<_>) = events
        .into_iter()
        .map(|e| (timestamp::parse(&e.time), e))
        .partition(|(t, _)| t.is_some());

    dated.sort_by_key(|(t, _)| *t);

    dated
        .into_iter()
        .chain(undated)
        .map(|(_, e)| e)
        .collect()
}
