//! Historical incident and runbook lookup over a local knowledge base.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{CollectContext, CollectError, Collector};
use crate::evidence::{Evidence, Source};
use crate::timeline::truncate_chars;
use crate::verify::terms;

const MAX_INCIDENTS: usize = 5;
const MAX_RUNBOOKS: usize = 3;
const MIN_INCIDENT_SIMILARITY: f64 = 0.3;
const MIN_RUNBOOK_SIMILARITY: f64 = 0.25;
/// Runbooks are general advice, ranked below matching incidents.
const RUNBOOK_WEIGHT: f64 = 0.9;
const GENERIC_RUNBOOK_CONFIDENCE: f64 = 0.5;
const RESOLUTION_CHARS: usize = 150;
const RUNBOOK_CHARS: usize = 300;
const DEDUP_PREFIX_CHARS: usize = 100;

/// Generic advice used when the knowledge base is empty.
const GENERIC_RUNBOOKS: [(&[&str], &str); 3] = [
    (
        &["memory", "leak", "oom"],
        "Runbook: Memory Issues - Check for memory leaks, review heap dumps, monitor GC activity",
    ),
    (
        &["cpu", "spike", "high"],
        "Runbook: High CPU - Profile application, check for infinite loops, review thread dumps",
    ),
    (
        &["connection", "timeout", "pool"],
        "Runbook: Connection Issues - Verify pool configuration, check network latency, review firewall rules",
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentRecord {
    pub id: String,
    /// ISO-8601 date of the incident.
    pub date: String,
    pub root_cause: String,
    pub symptoms: Vec<String>,
    pub services: Vec<String>,
    pub resolution: String,
}

impl IncidentRecord {
    /// `Historical Incident ID | Root Cause: … | Services: … | Resolution: …`
    pub fn render(&self) -> String {
        let id = if self.id.is_empty() { "Unknown" } else { self.id.as_str() };
        let mut parts = vec![format!("Historical Incident {}", id)];
        if !self.root_cause.is_empty() {
            parts.push(format!("Root Cause: {}", self.root_cause));
        }
        if !self.symptoms.is_empty() {
            parts.push(format!("Symptoms: {}", self.symptoms.join(", ")));
        }
        if !self.services.is_empty() {
            parts.push(format!("Services: {}", self.services.join(", ")));
        }
        if !self.resolution.is_empty() {
            parts.push(format!(
                "Resolution: {}",
                truncate_chars(&self.resolution, RESOLUTION_CHARS)
            ));
        }
        parts.join(" | ")
    }

    fn search_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.root_cause,
            self.symptoms.join(" "),
            self.services.join(" "),
            self.resolution
        )
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Runbook {
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
}

impl Runbook {
    pub fn render(&self) -> String {
        let title = if self.title.is_empty() { "Unknown" } else { self.title.as_str() };
        format!("Runbook: {} - {}", title, truncate_chars(&self.content, RUNBOOK_CHARS))
    }

    fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.content, self.keywords.join(" ")).to_lowercase()
    }
}

/// Knowledge base file:
///
/// ```toml
/// [[incidents]]
/// id = "INC-089"
/// date = "2023-11-02T09:12:00Z"
/// root_cause = "Memory leak in connection pool"
/// services = ["payment-api"]
/// resolution = "Rolled back v2.0.3"
///
/// [[runbooks]]
/// title = "Memory Issues"
/// content = "Capture a heap dump ..."
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBase {
    pub incidents: Vec<IncidentRecord>,
    pub runbooks: Vec<Runbook>,
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read knowledge base: {}", path.display()))?;
        let kb: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse knowledge base: {}", path.display()))?;
        info!(
            path = %path.display(),
            incidents = kb.incidents.len(),
            runbooks = kb.runbooks.len(),
            "loaded knowledge base"
        );
        Ok(kb)
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty() && self.runbooks.is_empty()
    }
}

/// Fraction of `terms` found in `text`.
fn similarity(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    terms.iter().filter(|t| text.contains(t.as_str())).count() as f64 / terms.len() as f64
}

#[derive(Debug, Default, Clone)]
pub struct KnowledgeCollector {
    kb: KnowledgeBase,
}

impl KnowledgeCollector {
    pub fn new(kb: KnowledgeBase) -> Self {
        Self { kb }
    }

    pub fn search(&self, ctx: &CollectContext) -> Vec<Evidence> {
        let query_terms = search_terms(ctx);

        let evidence = if self.kb.is_empty() {
            generic_runbooks(ctx)
        } else {
            let mut found = self.incidents(&query_terms, &ctx.plan.affected_services);
            found.extend(self.runbooks(&query_terms));
            found
        };

        let ranked = rank(dedup(evidence));
        debug!(terms = query_terms.len(), matched = ranked.len(), "Knowledge search finished");
        ranked
    }

    fn incidents(&self, query_terms: &[String], services: &[String]) -> Vec<Evidence> {
        let mut scored: Vec<(f64, &IncidentRecord)> = self
            .kb
            .incidents
            .iter()
            .filter(|inc| serves_any(inc, services))
            .map(|inc| (similarity(query_terms, &inc.search_text()), inc))
            .filter(|(sim, _)| *sim >= MIN_INCIDENT_SIMILARITY)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(MAX_INCIDENTS)
            .map(|(sim, inc)| {
                Evidence::new(Source::Historical, inc.render(), inc.date.clone(), sim)
                    .with_meta("type", json!("historical_incident"))
                    .with_meta("incident_id", json!(inc.id))
                    .with_meta("root_cause", json!(inc.root_cause))
                    .with_meta("services", json!(inc.services))
            })
            .collect()
    }

    fn runbooks(&self, query_terms: &[String]) -> Vec<Evidence> {
        let mut scored: Vec<(f64, &Runbook)> = self
            .kb
            .runbooks
            .iter()
            .map(|rb| (similarity(query_terms, &rb.search_text()), rb))
            .filter(|(sim, _)| *sim >= MIN_RUNBOOK_SIMILARITY)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(MAX_RUNBOOKS)
            .map(|(sim, rb)| {
                Evidence::new(Source::Runbook, rb.render(), "", sim * RUNBOOK_WEIGHT)
                    .with_meta("type", json!("runbook"))
                    .with_meta("title", json!(rb.title))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Collector for KnowledgeCollector {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn source(&self) -> Source {
        Source::Historical
    }

    async fn collect(&self, ctx: &CollectContext) -> Result<Vec<Evidence>, CollectError> {
        Ok(self.search(ctx))
    }
}

/// Plan symptoms, plan services, then key terms of the query; deduplicated.
fn search_terms(ctx: &CollectContext) -> Vec<String> {
    let mut seen = HashSet::new();
    ctx.plan
        .symptoms
        .iter()
        .chain(ctx.plan.affected_services.iter())
        .map(|s| s.to_lowercase())
        .chain(terms::extract(&ctx.request.query))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Incidents without a service list are never filtered out.
fn serves_any(incident: &IncidentRecord, services: &[String]) -> bool {
    if services.is_empty() || incident.services.is_empty() {
        return true;
    }
    incident.services.iter().any(|svc| {
        let svc = svc.to_lowercase();
        services.iter().any(|s| svc.contains(s.as_str()))
    })
}

fn generic_runbooks(ctx: &CollectContext) -> Vec<Evidence> {
    let text = format!("{} {}", ctx.plan.symptoms.join(" "), ctx.request.query).to_lowercase();
    GENERIC_RUNBOOKS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, content)| {
            Evidence::new(Source::Runbook, *content, "", GENERIC_RUNBOOK_CONFIDENCE)
                .with_meta("type", json!("generic_runbook"))
        })
        .collect()
}

/// Drop items whose first 100 lowercased characters were already seen.
fn dedup(evidence: Vec<Evidence>) -> Vec<Evidence> {
    let mut seen = HashSet::new();
    evidence
        .into_iter()
        .filter(|ev| {
            let key: String = ev.content().to_lowercase().chars().take(DEDUP_PREFIX_CHARS).collect();
            seen.insert(key)
        })
        .collect()
}

fn rank(mut evidence: Vec<Evidence>) -> Vec<Evidence> {
    evidence.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AnalysisRequest;
    use crate::plan::RulePlanner;
    use std::io::Write;

    fn ctx(query: &str) -> CollectContext {
        let request = AnalysisRequest::new(query);
        CollectContext {
            plan: RulePlanner.plan_sync(&request),
            request,
        }
    }

    fn kb() -> KnowledgeBase {
        toml::from_str(
            r#"
[[incidents]]
id = "INC-089"
date = "2023-11-02T09:12:00Z"
root_cause = "Memory leak in connection pool"
symptoms = ["memory", "timeout"]
services = ["payment-api"]
resolution = "Rolled back the pool change"

[[incidents]]
id = "INC-017"
root_cause = "Expired TLS certificate"
services = ["edge"]

[[runbooks]]
title = "Connection pool exhaustion"
content = "Check pool size against request rate"
keywords = ["pool", "connection", "timeout"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_render_incident() {
        let mut inc = kb().incidents[0].clone();
        assert_eq!(
            inc.render(),
            "Historical Incident INC-089 | Root Cause: Memory leak in connection pool | \
             Symptoms: memory, timeout | Services: payment-api | Resolution: Rolled back the pool change"
        );
        inc.resolution = "r".repeat(200);
        assert!(inc.render().ends_with(&format!("{}...", "r".repeat(150))));
    }

    #[test]
    fn test_search_matches_incident_and_runbook() {
        let collector = KnowledgeCollector::new(kb());
        let ev = collector.search(&ctx("payment api memory leak timeout in pool"));

        assert_eq!(ev.len(), 2);
        assert_eq!(ev[0].source(), Source::Historical);
        assert!(ev[0].content().starts_with("Historical Incident INC-089"));
        assert_eq!(ev[0].timestamp(), "2023-11-02T09:12:00Z");
        assert_eq!(ev[1].source(), Source::Runbook);
        assert!(ev[0].confidence() >= ev[1].confidence());
        assert!(ev[1].confidence() <= RUNBOOK_WEIGHT);
    }

    #[test]
    fn test_unrelated_query_finds_nothing() {
        let collector = KnowledgeCollector::new(kb());
        assert!(collector.search(&ctx("disk quota exceeded")).is_empty());
    }

    #[test]
    fn test_empty_base_uses_generic_runbooks() {
        let collector = KnowledgeCollector::default();
        let ev = collector.search(&ctx("memory climbing, connection timeout"));
        let contents: Vec<&str> = ev.iter().map(|e| e.content()).collect();
        assert_eq!(contents, vec![GENERIC_RUNBOOKS[0].1, GENERIC_RUNBOOKS[2].1]);
        assert!(ev.iter().all(|e| e.confidence() == GENERIC_RUNBOOK_CONFIDENCE));
    }

    #[test]
    fn test_dedup_on_prefix() {
        let long = "x".repeat(120);
        let items = vec![
            Evidence::new(Source::Runbook, format!("{}a", long), "", 0.5),
            Evidence::new(Source::Runbook, format!("{}b", long.to_uppercase()), "", 0.5),
            Evidence::new(Source::Runbook, "short", "", 0.5),
        ];
        assert_eq!(dedup(items).len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[runbooks]]\ntitle = \"Disk\"\ncontent = \"Free space\"").unwrap();
        let kb = KnowledgeBase::load(file.path()).unwrap();
        assert_eq!(kb.runbooks.len(), 1);
        assert!(kb.incidents.is_empty());
        assert!(KnowledgeBase::load(Path::new("/nonexistent/kb.toml")).is_err());
    }

    #[tokio::test]
    async fn test_collector_trait() {
        let collector = KnowledgeCollector::new(kb());
        let c = ctx("memory leak in pool");
        let ev = collector.collect(&c).await.unwrap();
        assert!(!ev.is_empty());
        assert_eq!(collector.source(), Source::Historical);
    }
}
