//! Complexity Classifier.
//!
//! Reads only the last message's text plus structural features of the full
//! sequence. Deterministic and total: identical input always yields
//! byte-identical output, and there is no error path — an empty or
//! malformed sequence degrades to a fixed default rather than failing,
//! since the orchestrator must never see a classifier exception.

use crate::config::ComplexityTier;
use crate::message::{Message, Role};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub tier: ComplexityTier,
    pub confidence: f64,
    pub reason: String,
    /// `{simple, mid, complex, reasoning}`, summing to 1 (invariant 5).
    pub scores: TierScores,
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TierScores {
    pub simple: f64,
    pub mid: f64,
    pub complex: f64,
    pub reasoning: f64,
}

impl TierScores {
    fn get(&self, tier: ComplexityTier) -> f64 {
        match tier {
            ComplexityTier::Simple => self.simple,
            ComplexityTier::Mid => self.mid,
            ComplexityTier::Complex => self.complex,
            ComplexityTier::Reasoning => self.reasoning,
        }
    }

    fn set(&mut self, tier: ComplexityTier, v: f64) {
        match tier {
            ComplexityTier::Simple => self.simple = v,
            ComplexityTier::Mid => self.mid = v,
            ComplexityTier::Complex => self.complex = v,
            ComplexityTier::Reasoning => self.reasoning = v,
        }
    }

    fn sum(&self) -> f64 {
        self.simple + self.mid + self.complex + self.reasoning
    }

    fn uniform() -> Self {
        Self {
            simple: 0.25,
            mid: 0.25,
            complex: 0.25,
            reasoning: 0.25,
        }
    }
}

type Keyword = (&'static str, f64);

const SIMPLE_KEYWORDS: &[Keyword] = &[
    ("hi", 0.6),
    ("hello", 0.6),
    ("hey", 0.6),
    ("thanks", 0.7),
    ("thank you", 0.7),
    ("ok", 0.5),
    ("okay", 0.5),
    ("yes", 0.5),
    ("no", 0.5),
    ("sure", 0.5),
    ("got it", 0.6),
    ("sounds good", 0.6),
    ("cool", 0.5),
    ("nice", 0.5),
    ("good morning", 0.8),
    ("good afternoon", 0.8),
    ("bye", 0.6),
    ("goodbye", 0.6),
    ("just wanted to say", 1.0),
];

const MID_KEYWORDS: &[Keyword] = &[
    ("explain", 1.0),
    ("summarize", 1.0),
    ("summary", 0.9),
    ("what is the difference", 1.2),
    ("compare", 1.1),
    ("comparison", 1.1),
    ("how does this work", 1.0),
    ("what does this do", 0.9),
    ("variable", 0.6),
    ("loop", 0.6),
    ("function", 0.7),
    ("basic", 0.6),
    ("simple example", 0.7),
    ("can you clarify", 1.0),
    ("overview", 0.8),
    ("walk me through", 1.5),
];

const COMPLEX_KEYWORDS: &[Keyword] = &[
    ("architecture", 1.2),
    ("design pattern", 1.1),
    ("debug", 1.0),
    ("debugging", 1.0),
    ("fix the bug", 1.1),
    ("error", 0.8),
    ("exception", 0.8),
    ("stack trace", 1.0),
    ("optimize", 1.0),
    ("optimization", 1.0),
    ("performance", 0.9),
    ("implement", 0.9),
    ("implementation", 0.9),
    ("build a", 0.7),
    ("refactor", 1.1),
    ("refactoring", 1.1),
    ("multi-step", 1.0),
    ("multiple steps", 1.0),
    ("security", 1.1),
    ("vulnerability", 1.2),
    ("authentication", 0.9),
    ("race condition", 1.2),
    ("memory leak", 1.2),
    ("concurrency", 1.1),
    ("distributed system", 1.2),
];

const REASONING_KEYWORDS: &[Keyword] = &[
    ("prove", 1.4),
    ("proof", 1.4),
    ("theorem", 1.5),
    ("proof by contradiction", 1.5),
    ("strategy", 1.0),
    ("strategic", 1.0),
    ("ethical", 1.2),
    ("ethics", 1.2),
    ("analyze", 1.1),
    ("analysis", 1.0),
    ("research", 1.0),
    ("logic", 1.1),
    ("logical", 1.0),
    ("consequence", 0.9),
    ("consequences", 0.9),
    ("implications", 1.0),
    ("trade-off", 0.9),
    ("tradeoffs", 0.9),
    ("first principles", 1.3),
];

const MATH_DOMAIN_KEYWORDS: &[&str] = &["prove", "proof", "theorem", "equation", "logic", "logical"];
const ARCHITECTURE_DOMAIN_KEYWORDS: &[&str] = &["architecture", "design pattern", "distributed system"];

/// Structural adjustment per tier: `(simple, mid, complex, reasoning)`.
type Adjustment = (f64, f64, f64, f64);

const CODE_BLOCK_ADJUSTMENT: Adjustment = (-0.3, 0.4, 0.6, 0.2);
const TOOL_CALL_ADJUSTMENT: Adjustment = (-0.8, 0.6, 1.0, 0.5);
const SINGLE_QUESTION_ADJUSTMENT: Adjustment = (0.3, 0.1, -0.1, -0.2);
const MULTIPLE_QUESTION_ADJUSTMENT: Adjustment = (-0.2, 0.1, 0.2, 0.3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthBucket {
    VeryShort,
    Short,
    Medium,
    Long,
    VeryLong,
}

impl LengthBucket {
    fn classify(len: usize) -> Self {
        if len <= 50 {
            LengthBucket::VeryShort
        } else if len <= 200 {
            LengthBucket::Short
        } else if len <= 1000 {
            LengthBucket::Medium
        } else if len <= 3000 {
            LengthBucket::Long
        } else {
            LengthBucket::VeryLong
        }
    }

    fn adjustment(self) -> Adjustment {
        match self {
            LengthBucket::VeryShort => (0.8, -0.2, -0.4, -0.4),
            LengthBucket::Short => (0.4, 0.1, -0.2, -0.3),
            LengthBucket::Medium => (-0.1, 0.3, 0.2, 0.0),
            LengthBucket::Long => (-0.3, 0.1, 0.3, 0.3),
            LengthBucket::VeryLong => (-0.5, -0.2, 0.2, 0.6),
        }
    }

    fn structural_tag(self) -> Option<&'static str> {
        match self {
            LengthBucket::Short => Some("structural:short-message"),
            LengthBucket::Long => Some("structural:long-message"),
            LengthBucket::VeryLong => Some("structural:very-long-message"),
            LengthBucket::VeryShort | LengthBucket::Medium => None,
        }
    }
}

fn apply(scores: &mut TierScores, adj: Adjustment) {
    scores.simple += adj.0;
    scores.mid += adj.1;
    scores.complex += adj.2;
    scores.reasoning += adj.3;
}

fn has_code_blocks(text: &str) -> bool {
    text.contains("```") || text.contains('`')
}

fn has_tool_calls(messages: &[Message]) -> bool {
    messages
        .iter()
        .any(|m| m.has_tool_calls() || m.role == Role::Tool)
}

/// Classify a conversation. Never panics, never errors.
pub fn classify(messages: &[Message]) -> ClassificationResult {
    if messages.is_empty() {
        return ClassificationResult {
            tier: ComplexityTier::Simple,
            confidence: 0.5,
            reason: "empty conversation".to_string(),
            scores: TierScores::uniform(),
            signals: vec!["structural:empty-conversation".to_string()],
        };
    }

    let last = messages.last().expect("checked non-empty above");
    let text = last.content.flatten_text();
    let lower = text.to_lowercase();

    let mut scores = TierScores::default();
    let mut matched_keywords: BTreeSet<&'static str> = BTreeSet::new();

    for &(kw, weight) in SIMPLE_KEYWORDS {
        if lower.contains(kw) {
            scores.simple += weight;
            matched_keywords.insert(kw);
        }
    }
    for &(kw, weight) in MID_KEYWORDS {
        if lower.contains(kw) {
            scores.mid += weight;
            matched_keywords.insert(kw);
        }
    }
    for &(kw, weight) in COMPLEX_KEYWORDS {
        if lower.contains(kw) {
            scores.complex += weight;
            matched_keywords.insert(kw);
        }
    }
    for &(kw, weight) in REASONING_KEYWORDS {
        if lower.contains(kw) {
            scores.reasoning += weight;
            matched_keywords.insert(kw);
        }
    }

    let mut signals: Vec<String> = matched_keywords
        .iter()
        .map(|kw| format!("keyword:{kw}"))
        .collect();

    let has_code = has_code_blocks(&text);
    if has_code {
        apply(&mut scores, CODE_BLOCK_ADJUSTMENT);
        signals.push("structural:code-blocks".to_string());
    }

    let has_tools = has_tool_calls(messages);
    if has_tools {
        apply(&mut scores, TOOL_CALL_ADJUSTMENT);
        signals.push("structural:tool-calls".to_string());
    }

    let message_length = text.chars().count();
    let bucket = LengthBucket::classify(message_length);
    apply(&mut scores, bucket.adjustment());
    if let Some(tag) = bucket.structural_tag() {
        signals.push(tag.to_string());
    }

    let question_count = text.matches('?').count();
    if question_count == 1 {
        apply(&mut scores, SINGLE_QUESTION_ADJUSTMENT);
    } else if question_count > 1 {
        apply(&mut scores, MULTIPLE_QUESTION_ADJUSTMENT);
        signals.push("structural:multiple-questions".to_string());
    }

    // Step 3: shift to non-negative, then normalize.
    let min = [scores.simple, scores.mid, scores.complex, scores.reasoning]
        .into_iter()
        .fold(f64::INFINITY, f64::min);
    let shift = (-min).max(0.0);
    apply(
        &mut scores,
        (shift, shift, shift, shift),
    );

    let sum = scores.sum();
    if sum <= 0.0 {
        scores = TierScores::uniform();
    } else {
        scores.simple /= sum;
        scores.mid /= sum;
        scores.complex /= sum;
        scores.reasoning /= sum;
    }

    // Step 4: winner / confidence.
    let mut ranked: Vec<(ComplexityTier, f64)> = ComplexityTier::ALL
        .into_iter()
        .map(|t| (t, scores.get(t)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let winner = ranked[0].0;
    let winner_score = ranked[0].1;
    let second_score = ranked.get(1).map(|(_, s)| *s).unwrap_or(0.0);
    let confidence = confidence_from_margin(winner_score, second_score);

    let reason = build_reason(winner, confidence, &matched_keywords, has_code, has_tools, bucket, question_count);

    ClassificationResult {
        tier: winner,
        confidence: (confidence * 100.0).round() / 100.0,
        reason,
        scores,
        signals,
    }
}

/// Confidence = `max(0.5, winner - secondBest + 0.5)` clamped to `[0,1]`.
fn confidence_from_margin(winner: f64, second_best: f64) -> f64 {
    (winner - second_best + 0.5).max(0.5).clamp(0.0, 1.0)
}

fn confidence_band(confidence: f64) -> &'static str {
    if confidence >= 0.7 {
        "high"
    } else if confidence >= 0.5 {
        "medium"
    } else {
        "low"
    }
}

#[allow(clippy::too_many_arguments)]
fn build_reason(
    tier: ComplexityTier,
    confidence: f64,
    matched_keywords: &BTreeSet<&'static str>,
    has_code: bool,
    has_tools: bool,
    bucket: LengthBucket,
    question_count: usize,
) -> String {
    let band = confidence_band(confidence);

    let dominant_structural = if has_code {
        "code present"
    } else if has_tools {
        "tool usage present"
    } else if bucket == LengthBucket::VeryLong {
        "very long message"
    } else if bucket == LengthBucket::Long {
        "long message"
    } else if bucket == LengthBucket::Short || bucket == LengthBucket::VeryShort {
        "short message"
    } else if question_count > 1 {
        "multiple questions"
    } else {
        "plain message"
    };

    let domain_hint = if matched_keywords.iter().any(|k| MATH_DOMAIN_KEYWORDS.contains(k)) {
        Some("mathematical content detected")
    } else if matched_keywords
        .iter()
        .any(|k| ARCHITECTURE_DOMAIN_KEYWORDS.contains(k))
    {
        Some("architectural discussion detected")
    } else if tier == ComplexityTier::Complex {
        Some("complex technical task")
    } else if tier == ComplexityTier::Reasoning {
        Some("deep reasoning required")
    } else {
        None
    };

    match domain_hint {
        Some(hint) => format!("{} ({} confidence, {}; {})", tier.as_str(), band, dominant_structural, hint),
        None => format!("{} ({} confidence, {})", tier.as_str(), band, dominant_structural),
    }
}
