//! Compact string rendering for decision payloads.

use std::collections::HashSet;

use crate::timeline::{truncate_chars, TimelineEvent};

/// Events rendered into an answer's timeline string.
pub const TIMELINE_EVENTS: usize = 5;

const EVENT_CHARS: usize = 60;

/// One `HH:MM → event` line per event. ISO times are cut to the clock part;
/// anything else is printed as given.
pub fn timeline(events: &[TimelineEvent]) -> String {
    if events.is_empty() {
        return "No timeline data available".to_string();
    }

    events
        .iter()
        .take(TIMELINE_EVENTS)
        .map(|e| format!("{} → {}", clock(&e.time), truncate_chars(&e.event, EVENT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clock(time: &str) -> String {
    match time.split_once('T') {
        Some((_, rest)) => rest.chars().take(5).collect(),
        None => time.to_string(),
    }
}

/// Order-preserving dedup, truncated to `limit` entries.
pub fn dedup_limit<I>(items: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .take(limit)
        .collect()
}
