//! Heuristic Summarizer.
//!
//! Extracts "key points" from a run of older messages via role-specific
//! pattern tables — no LLM call, pure string matching.

use crate::message::{Message, Role};

#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub summary: Option<String>,
    pub method: &'static str,
    pub key_points_count: usize,
    pub tokens_saved: usize,
}

const ASSISTANT_PRIORITY: &[&str] = &[
    "the solution is",
    "i recommend",
    "the best approach",
    "you should",
    "the issue is",
    "the problem is",
    "i created",
    "i implemented",
    "i fixed",
    "i updated",
    "i added",
    "the key insight",
    "importantly",
    "critical",
    "essential",
    "the main",
];
const ASSISTANT_FACTUAL: &[&str] = &["this means", "which means", "because", "due to", "results in", "causes", "leads to"];
const ASSISTANT_TECHNICAL: &[&str] = &[
    "function",
    "variable",
    "class",
    "method",
    "api",
    "endpoint",
    "database",
    "error",
    "exception",
    "configuration",
    "parameter",
];
const ASSISTANT_FILLER: &[&str] = &[
    "let me",
    "i can help",
    "i'll help",
    "here's",
    "i understand",
    "of course",
    "certainly",
    "i'd be happy",
    "let's",
];
const USER_REQUEST: &[&str] = &[
    "can you",
    "could you",
    "please",
    "i need",
    "i want",
    "help me",
    "how do i",
    "how can i",
    "what is",
    "explain",
];
const USER_CONTEXT: &[&str] = &[
    "i have",
    "i'm using",
    "my setup",
    "my system",
    "currently",
    "right now",
    "the requirement",
    "the constraint",
];
const GENERIC_SUPPRESSION: &[&str] = &["let me know", "if you need", "feel free", "hope this helps", "good luck"];

fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

fn starts_with_any(lower: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| lower.starts_with(p))
}

fn contains_any(lower: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| lower.contains(p))
}

/// Classify one sentence for one role, returning the kept (possibly
/// truncated) point, or `None` if it should be discarded.
fn classify_sentence(role: Role, sentence: &str) -> Option<String> {
    let lower = sentence.to_lowercase();

    match role {
        Role::Assistant => {
            if starts_with_any(&lower, ASSISTANT_FILLER) {
                return None;
            }
            if sentence.len() < 20 {
                return None;
            }
            if contains_any(&lower, ASSISTANT_PRIORITY) {
                return Some(truncate(sentence, 120));
            }
            if contains_any(&lower, ASSISTANT_FACTUAL) || contains_any(&lower, ASSISTANT_TECHNICAL) {
                return Some(truncate(sentence, 100));
            }
            None
        }
        Role::User => {
            if sentence.len() < 15 {
                return None;
            }
            if contains_any(&lower, USER_REQUEST) || contains_any(&lower, USER_CONTEXT) {
                return Some(truncate(sentence, 100));
            }
            None
        }
        Role::System | Role::Tool => None,
    }
}

fn normalize_for_dedup(point: &str) -> String {
    let lowered = point.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&collapsed, 50)
}

/// Summarize a run of older messages.
pub fn summarize(messages: &[Message]) -> SummaryResult {
    let mut seen = std::collections::HashSet::new();
    let mut points: Vec<String> = Vec::new();

    for message in messages {
        let min_len = if message.role == Role::Assistant { 20 } else { 15 };
        let text = message.content.flatten_text();
        for sentence in split_sentences(&text) {
            if sentence.len() < min_len {
                continue;
            }
            if let Some(point) = classify_sentence(message.role, &sentence) {
                let key = normalize_for_dedup(&point);
                if seen.insert(key) {
                    points.push(point);
                }
            }
        }
    }

    // Keep the last 8, then (after suppression re-filter) the last 5.
    let tail8: Vec<String> = points.iter().rev().take(8).rev().cloned().collect();
    let significant: Vec<String> = tail8
        .into_iter()
        .filter(|p| !contains_any(&p.to_lowercase(), GENERIC_SUPPRESSION))
        .collect();
    let tail5: Vec<String> = significant.iter().rev().take(5).rev().cloned().collect();

    if tail5.is_empty() {
        return SummaryResult {
            summary: None,
            method: "heuristic",
            key_points_count: 0,
            tokens_saved: 0,
        };
    }

    let summary = format!("Previous context: {}.", tail5.join("; "));
    let original_tokens = crate::estimator::estimate(messages);
    let summary_tokens = crate::estimator::estimate_content(&crate::message::Content::Text(summary.clone()));

    SummaryResult {
        key_points_count: tail5.len(),
        summary: Some(summary),
        method: "heuristic",
        tokens_saved: original_tokens.saturating_sub(summary_tokens),
    }
}
