use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{timestamp, EventType, TimelineEvent};
use crate::config::CorrelationConfig;
use crate::evidence::Source;

/// Known cause -> effect pairs and their labels.
const CAUSAL_TABLE: [((EventType, EventType), &str); 6] = [
    ((EventType::Deployment, EventType::Error), "Deployment likely caused errors"),
    ((EventType::Deployment, EventType::MetricAnomaly), "Deployment triggered metric change"),
    ((EventType::MetricAnomaly, EventType::Error), "Metric anomaly preceded errors"),
    ((EventType::Capacity, EventType::Performance), "Capacity issue caused performance degradation"),
    ((EventType::Error, EventType::Error), "Cascading errors"),
    ((EventType::Configuration, EventType::Error), "Config change may have caused errors"),
];

/// Pairs forced to `Strong` when under [`STRONG_CAUSAL_MAX_SECS`] apart.
const STRONG_CAUSAL: [(EventType, EventType); 3] = [
    (EventType::Deployment, EventType::Error),
    (EventType::Deployment, EventType::MetricAnomaly),
    (EventType::Configuration, EventType::Error),
];

/// Categories whose total absence is reported, with the gap text.
const EXPECTED_SOURCES: [(Source, &str); 3] = [
    (Source::Image, "No dashboard metrics provided"),
    (Source::Log, "No application logs provided"),
    (Source::Historical, "No historical incident data available"),
];

/// Upper bound for forcing a strong-causal pair to `Strong`.
const STRONG_CAUSAL_MAX_SECS: f64 = 300.0;

pub const INSUFFICIENT_TIMELINE: &str = "Insufficient timeline data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

/// A temporal link between two timeline events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub event1: String,
    pub event2: String,
    pub time1: String,
    pub time2: String,
    pub time_delta_seconds: f64,
    pub pattern: String,
    pub strength: Strength,
    pub causal_direction: String,
}

pub fn lookup_pattern(first: EventType, second: EventType) -> Option<&'static str> {
    CAUSAL_TABLE
        .iter()
        .find(|(pair, _)| *pair == (first, second))
        .map(|(_, label)| *label)
}

pub fn strength(delta_secs: f64, first: EventType, second: EventType) -> Strength {
    if STRONG_CAUSAL.contains(&(first, second)) && delta_secs < STRONG_CAUSAL_MAX_SECS {
        return Strength::Strong;
    }
    if delta_secs < 60.0 {
        Strength::Strong
    } else if delta_secs < 180.0 {
        Strength::Medium
    } else {
        Strength::Weak
    }
}

fn check_pair(a: &TimelineEvent, b: &TimelineEvent, config: &CorrelationConfig) -> Option<Correlation> {
    let delta = timestamp::delta_secs(&a.time, &b.time)?;
    if delta > config.window_secs as f64 {
        return None;
    }

    let (pattern, strength, direction) = match lookup_pattern(a.event_type, b.event_type) {
        Some(label) => (
            label.to_string(),
            strength(delta, a.event_type, b.event_type),
            "event1 → event2",
        ),
        None if delta < config.generic_window_secs as f64 => (
            format!("{} followed by {}", a.event_type, b.event_type),
            Strength::Weak,
            "possible",
        ),
        None => return None,
    };

    Some(Correlation {
        event1: a.event.clone(),
        event2: b.event.clone(),
        time1: a.time.clone(),
        time2: b.time.clone(),
        time_delta_seconds: delta,
        pattern,
        strength,
        causal_direction: direction.to_string(),
    })
}

/// Scan each event against the next `lookahead` events, dropping repeats of
/// the same (time1, time2, pattern).
pub fn find_correlations(events: &[TimelineEvent], config: &CorrelationConfig) -> Vec<Correlation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (i, first) in events.iter().enumerate() {
        let end = (i + 1 + config.lookahead).min(events.len());
        for second in &events[i + 1..end] {
            let Some(corr) = check_pair(first, second, config) else {
                continue;
            };
            let sig = (corr.time1.clone(), corr.time2.clone(), corr.pattern.clone());
            if seen.insert(sig) {
                out.push(corr);
            }
        }
    }

    out
}

/// Describe missing or sparse coverage.
pub fn find_gaps(events: &[TimelineEvent], config: &CorrelationConfig) -> Vec<String> {
    let dated = events.iter().filter(|e| e.is_dated()).count();
    if dated < 2 {
        return vec![INSUFFICIENT_TIMELINE.to_string()];
    }

    let mut gaps = Vec::new();

    for pair in events.windows(2) {
        if let Some(delta) = timestamp::delta_secs(&pair[0].time, &pair[1].time) {
            if delta > config.large_gap_secs as f64 {
                gaps.push(format!(
                    "Large time gap ({} minutes) between {} and {}",
                    (delta / 60.0) as u64,
                    pair[0].time,
                    pair[1].time
                ));
            }
        }
    }

    for (source, message) in EXPECTED_SOURCES {
        if !events.iter().any(|e| e.source == source) {
            gaps.push(message.to_string());
        }
    }

    gaps
}
