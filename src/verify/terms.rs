//! Key-term extraction and substring support matching.

const STOP_WORDS: [&str; 9] = ["the", "a", "an", "in", "on", "at", "to", "from", "by"];

/// Terms needed for an evidence item to count as supporting.
pub const MIN_MATCHING_TERMS: usize = 2;

/// Lowercased whitespace tokens longer than three characters, minus stop words.
pub fn extract(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Number of terms occurring as substrings of `content` (case-insensitive).
pub fn count_matches(terms: &[String], content: &str) -> usize {
    let lower = content.to_lowercase();
    terms.iter().filter(|t| lower.contains(t.as_str())).count()
}

pub fn supports(terms: &[String], content: &str) -> bool {
    count_matches(terms, content) >= MIN_MATCHING_TERMS
}
