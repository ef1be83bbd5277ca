//! Evidence model: attributed observations and the per-category accumulator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fixed set of evidence categories a collector can report under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Image,
    Log,
    Historical,
    Runbook,
    Metrics,
    Dashboard,
}

impl Source {
    /// Every category, in the order evidence is reported and verified.
    pub const ALL: [Source; 6] = [
        Source::Image,
        Source::Log,
        Source::Historical,
        Source::Runbook,
        Source::Metrics,
        Source::Dashboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Image => "image",
            Source::Log => "log",
            Source::Historical => "historical",
            Source::Runbook => "runbook",
            Source::Metrics => "metrics",
            Source::Dashboard => "dashboard",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PATTERNS_KEY: &str = "patterns";

/// A single attributed observation.
///
/// Fields are private so that the confidence clamp cannot be bypassed;
/// metadata may only grow after construction. Deserialization goes through
/// [`Evidence::new`] as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvidence")]
pub struct Evidence {
    source: Source,
    content: String,
    /// ISO-8601 string, or empty / free text when the collector had none.
    timestamp: String,
    confidence: f64,
    metadata: BTreeMap<String, serde_json::Value>,
}

/// Unchecked wire form of [`Evidence`].
#[derive(Deserialize)]
struct RawEvidence {
    source: Source,
    content: String,
    #[serde(default)]
    timestamp: String,
    confidence: f64,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl From<RawEvidence> for Evidence {
    fn from(raw: RawEvidence) -> Self {
        let mut ev = Evidence::new(raw.source, raw.content, raw.timestamp, raw.confidence);
        ev.metadata = raw.metadata;
        ev
    }
}

impl Evidence {
    pub fn new(
        source: Source,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            source,
            content: content.into(),
            timestamp: timestamp.into(),
            confidence: clamp_unit(confidence),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style metadata entry, used by collectors at creation time.
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.annotate(key, value);
        self
    }

    /// Append a metadata entry. Existing keys are never overwritten.
    pub fn annotate(&mut self, key: impl Into<String>, value: serde_json::Value) -> bool {
        let key = key.into();
        if self.metadata.contains_key(&key) {
            return false;
        }
        self.metadata.insert(key, value);
        true
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Append to the `patterns` metadata list, creating it on first use.
    pub fn push_pattern(&mut self, pattern: serde_json::Value) {
        match self.metadata.get_mut(PATTERNS_KEY) {
            Some(serde_json::Value::Array(list)) => list.push(pattern),
            Some(_) => {}
            None => {
                self.metadata
                    .insert(PATTERNS_KEY.to_string(), serde_json::Value::Array(vec![pattern]));
            }
        }
    }
}

/// Clamp to [0, 1]; NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Evidence partitioned by category.
///
/// Extending is plain per-category concatenation, so the result only depends
/// on the order in which batches are added, never on when they arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
    by_source: BTreeMap<Source, Vec<Evidence>>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch, routing each item to its own category.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Evidence>) {
        for ev in batch {
            self.by_source.entry(ev.source()).or_default().push(ev);
        }
    }

    pub fn get(&self, source: Source) -> &[Evidence] {
        self.by_source
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-empty categories in fixed category order.
    pub fn iter(&self) -> impl Iterator<Item = (Source, &[Evidence])> {
        self.by_source
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(source, items)| (*source, items.as_slice()))
    }

    /// All evidence flattened in category order.
    pub fn all(&self) -> Vec<Evidence> {
        self.iter().flat_map(|(_, items)| items.iter().cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Evidence> for EvidenceSet {
    fn from_iter<I: IntoIterator<Item = Evidence>>(iter: I) -> Self {
        let mut set = EvidenceSet::new();
        set.extend(iter);
        set
    }
}
