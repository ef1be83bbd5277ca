//! Keyword search over log records supplied with the request.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{CollectContext, CollectError, Collector};
use crate::evidence::{Evidence, Source};
use crate::plan::Plan;
use crate::timeline::timestamp;

/// Keywords used when the plan found no symptoms.
const DEFAULT_KEYWORDS: [&str; 3] = ["error", "exception", "failure"];
const TOP_K: usize = 20;
const MAX_CONFIDENCE: f64 = 0.95;
/// Items sharing a core message needed to call it a cluster.
const CLUSTER_MIN: usize = 3;

static ISO_TIMESTAMP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").ok());
static UUID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok()
});
static NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\d+\b").ok());
static OCCURRENCES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\(occurred \d+ times\)").ok());

/// A structured log line as shipped with an analysis request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    pub timestamp: String,
    pub service: String,
    pub level: String,
    pub message: String,
    pub stack_trace: Option<String>,
    /// Times this line was seen (deduplicated upstream).
    pub count: u32,
}

impl LogRecord {
    pub fn new(
        timestamp: impl Into<String>,
        service: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            service: service.into(),
            level: level.into(),
            message: message.into(),
            stack_trace: None,
            count: 1,
        }
    }

    fn has_stack_trace(&self) -> bool {
        self.stack_trace.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// `[service] LEVEL: message (occurred N times)`, omitting empty parts.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.service.is_empty() {
            parts.push(format!("[{}]", self.service));
        }
        if !self.level.is_empty() {
            parts.push(format!("{}:", self.level));
        }
        if !self.message.is_empty() {
            parts.push(self.message.clone());
        }
        if self.count > 1 {
            parts.push(format!("(occurred {} times)", self.count));
        }
        parts.join(" ")
    }

    pub fn score(&self, keywords: &[String]) -> f64 {
        let text = [
            self.message.as_str(),
            self.service.as_str(),
            self.level.as_str(),
            self.stack_trace.as_deref().unwrap_or(""),
        ]
        .join(" ")
        .to_lowercase();

        let mut score = 2.0 * keywords.iter().filter(|k| text.contains(k.as_str())).count() as f64;

        score += match self.level.to_uppercase().as_str() {
            "ERROR" => 3.0,
            "CRITICAL" => 5.0,
            "WARN" => 1.0,
            _ => 0.0,
        };
        if self.has_stack_trace() {
            score += 2.0;
        }
        if self.count > 10 {
            score += 1.0;
        }
        score
    }
}

/// Searches `AnalysisRequest::log_records`.
#[derive(Debug, Default, Clone)]
pub struct LogRecordCollector;

impl LogRecordCollector {
    pub fn search(&self, records: &[LogRecord], plan: &Plan) -> Vec<Evidence> {
        let keywords: Vec<String> = if plan.symptoms.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            plan.symptoms.iter().map(|s| s.to_lowercase()).collect()
        };

        let mut scored: Vec<(f64, &LogRecord)> = records
            .iter()
            .filter(|r| passes_filters(r, plan))
            .map(|r| (r.score(&keywords), r))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // stable: equal scores keep input order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut evidence: Vec<Evidence> = scored
            .into_iter()
            .take(TOP_K)
            .map(|(score, r)| {
                Evidence::new(Source::Log, r.render(), r.timestamp.clone(), (score / 10.0).min(MAX_CONFIDENCE))
                    .with_meta("service", json!(r.service))
                    .with_meta("level", json!(r.level))
                    .with_meta("count", json!(r.count))
            })
            .collect();

        mark_clusters(&mut evidence);

        debug!(records = records.len(), matched = evidence.len(), "Log search finished");
        evidence
    }
}

#[async_trait::async_trait]
impl Collector for LogRecordCollector {
    fn name(&self) -> &str {
        "log_search"
    }

    fn source(&self) -> Source {
        Source::Log
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError> {
        Ok(self.search(&ctx.request.log_records, &ctx.plan))
    }
}

/// Service filter matches when the record's service names any planned
/// service; records without a parseable timestamp pass the time filter.
fn passes_filters(record: &LogRecord, plan: &Plan) -> bool {
    if !plan.affected_services.is_empty() {
        let service = record.service.to_lowercase();
        if !plan.affected_services.iter().any(|s| service.contains(s.as_str())) {
            return false;
        }
    }

    if let Some(window) = plan.log_window {
        if let Some(t) = timestamp::parse(&record.timestamp) {
            return window.contains(t);
        }
    }

    true
}

/// Message with timestamps, UUIDs, occurrence counts and bare numbers removed.
pub fn core_message(content: &str) -> String {
    let mut core = content.to_string();
    for re in [&ISO_TIMESTAMP, &UUID, &OCCURRENCES, &NUMBER] {
        if let Some(re) = &**re {
            core = re.replace_all(&core, "").into_owned();
        }
    }
    core.trim().to_string()
}

fn mark_clusters(evidence: &mut [Evidence]) {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, ev) in evidence.iter().enumerate() {
        groups.entry(core_message(ev.content())).or_default().push(idx);
    }

    for (message, members) in groups {
        if members.len() < CLUSTER_MIN {
            continue;
        }
        let pattern = json!({
            "type": "error_cluster",
            "count": members.len(),
            "message": message,
        });
        for idx in members {
            evidence[idx].push_pattern(pattern.clone());
        }
    }
}
