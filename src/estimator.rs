//! Token Estimator.
//!
//! Pure, deterministic, O(total chars). Underestimation is tolerable;
//! overestimation is not — it would trigger spurious windowing.

use crate::message::{Content, Message};

const ROLE_OVERHEAD_TOKENS: usize = 5;
const CHARS_PER_TOKEN: usize = 4;
const NON_TEXT_BLOCK_OVERHEAD_TOKENS: usize = 10;
const TOOL_CALL_OVERHEAD_TOKENS: usize = 8;

fn chars_to_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for a single content value (used by callers that only
/// have a content fragment, not a full message — e.g. the windower's
/// remaining-budget check after trimming down to `rest[split:]`).
pub fn estimate_content(content: &Content) -> usize {
    let text_tokens = chars_to_tokens(content.char_len());
    let block_overhead = content.non_text_block_count() * NON_TEXT_BLOCK_OVERHEAD_TOKENS;
    text_tokens + block_overhead
}

/// Estimate tokens for a single message, including role overhead and any
/// tool-call records.
pub fn estimate_message(message: &Message) -> usize {
    let mut total = ROLE_OVERHEAD_TOKENS + estimate_content(&message.content);
    if let Some(calls) = &message.tool_calls {
        total += calls.len() * TOOL_CALL_OVERHEAD_TOKENS;
    }
    total
}

/// Estimate tokens across a sequence of messages.
pub fn estimate(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}
