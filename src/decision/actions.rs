//! Keyword → remediation action table.

/// Most actions handed back with an answer.
pub const MAX_ACTIONS: usize = 5;

/// Checked in order; every matching bucket contributes all its actions.
const ACTION_BUCKETS: [(&[&str], [&str; 3]); 5] = [
    (
        &["deploy"],
        [
            "Consider rolling back the recent deployment",
            "Review deployment changes and git diff",
            "Check deployment logs for errors",
        ],
    ),
    (
        &["memory", "leak"],
        [
            "Capture heap dump for analysis",
            "Review memory allocation patterns in recent changes",
            "Monitor garbage collection metrics",
        ],
    ),
    (
        &["connection", "pool"],
        [
            "Verify connection pool configuration",
            "Check for connection leaks in code",
            "Review database/service connection limits",
        ],
    ),
    (
        &["cpu"],
        [
            "Capture thread dump to identify hot spots",
            "Profile application for CPU-intensive operations",
            "Check for infinite loops or recursive calls",
        ],
    ),
    (
        &["traffic", "load"],
        [
            "Review request rate metrics",
            "Check load balancer configuration",
            "Consider scaling horizontally",
        ],
    ),
];

const GENERIC_ACTIONS: [&str; 3] = [
    "Review recent changes to the system",
    "Check service dependencies and health",
    "Examine error logs for additional context",
];

/// Recommended actions for a root cause, at most [`MAX_ACTIONS`].
pub fn recommend(root_cause: &str) -> Vec<String> {
    let lower = root_cause.to_lowercase();

    let mut actions: Vec<&str> = ACTION_BUCKETS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .flat_map(|(_, bucket)| bucket.iter().copied())
        .collect();

    if actions.is_empty() {
        actions.extend(GENERIC_ACTIONS);
    }

    actions.into_iter().take(MAX_ACTIONS).map(str::to_string).collect()
}
