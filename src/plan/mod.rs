//! Query planning: which services and symptoms to look for, and where in
//! time.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::AnalysisRequest;
use crate::timeline::timestamp;

const SERVICE_KEYWORDS: [&str; 9] = [
    "api", "database", "db", "redis", "cache", "gateway", "service", "server", "web",
];

const SYMPTOM_KEYWORDS: [&str; 9] = [
    "error", "timeout", "slow", "spike", "high", "outage", "down", "failure", "crash",
];

const HIGH_PRIORITY: [&str; 8] = [
    "outage", "down", "crash", "failure", "5xx", "error", "unavailable", "severe",
];

const MEDIUM_PRIORITY: [&str; 7] = [
    "slow", "latency", "degraded", "high cpu", "memory", "warning", "partial",
];

const LOG_WINDOW_MINUTES: i64 = 15;
const METRICS_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner unavailable: {0}")]
    Unavailable(String),
    #[error("planner returned malformed plan: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Inclusive time range around the incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SearchWindow {
    pub fn around(center: NaiveDateTime, minutes: i64) -> Self {
        let span = Duration::minutes(minutes);
        Self {
            start: center - span,
            end: center + span,
        }
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// As given in the request, or `unknown`.
    pub incident_time: String,
    pub affected_services: Vec<String>,
    pub symptoms: Vec<String>,
    /// `None` when the incident time is unknown; collectors then skip time filtering.
    pub log_window: Option<SearchWindow>,
    pub metrics_window: Option<SearchWindow>,
    pub priority: Priority,
}

impl Plan {
    /// Plan used when the planner fails: nothing targeted, nothing filtered.
    pub fn fallback(request: &AnalysisRequest) -> Self {
        Self {
            incident_time: incident_time(request),
            affected_services: Vec::new(),
            symptoms: Vec::new(),
            log_window: None,
            metrics_window: None,
            priority: Priority::Low,
        }
    }
}

fn incident_time(request: &AnalysisRequest) -> String {
    request
        .timestamp
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait::async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &AnalysisRequest) -> Result<Plan, PlanError>;
}

/// Keyword planner over the query text.
#[derive(Debug, Default, Clone)]
pub struct RulePlanner;

impl RulePlanner {
    pub fn plan_sync(&self, request: &AnalysisRequest) -> Plan {
        let query = request.query.to_lowercase();
        let matching = |words: &[&str]| -> Vec<String> {
            words
                .iter()
                .filter(|w| query.contains(**w))
                .map(|w| w.to_string())
                .collect()
        };

        let affected_services = matching(&SERVICE_KEYWORDS);
        let symptoms = matching(&SYMPTOM_KEYWORDS);
        let incident = request.timestamp.as_deref().and_then(timestamp::parse);

        Plan {
            incident_time: incident_time(request),
            priority: priority(&symptoms),
            affected_services,
            symptoms,
            log_window: incident.map(|t| SearchWindow::around(t, LOG_WINDOW_MINUTES)),
            metrics_window: incident.map(|t| SearchWindow::around(t, METRICS_WINDOW_MINUTES)),
        }
    }
}

#[async_trait::async_trait]
impl Planner for RulePlanner {
    async fn plan(&self, request: &AnalysisRequest) -> Result<Plan, PlanError> {
        Ok(self.plan_sync(request))
    }
}

pub fn priority(symptoms: &[String]) -> Priority {
    let any_of = |keywords: &[&str]| {
        symptoms.iter().any(|s| {
            let s = s.to_lowercase();
            keywords.iter().any(|k| s.contains(k))
        })
    };

    if any_of(&HIGH_PRIORITY) {
        Priority::High
    } else if any_of(&MEDIUM_PRIORITY) {
        Priority::Medium
    } else {
        Priority::Low
    }
}
