//! Conversation Windower.
//!
//! Keeps the recent suffix of a conversation and replaces the rest with a
//! heuristic summary, always preserving the system prompt.

pub mod summarizer;

use crate::config::WindowingConfig;
use crate::estimator;
use crate::message::{starts_conversation, Message, Role};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizationMethod {
    None,
    Heuristic,
    Llm,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowMeta {
    pub original_message_count: usize,
    pub windowed_message_count: usize,
    pub trimmed_message_count: usize,
    pub original_token_estimate: usize,
    pub windowed_token_estimate: usize,
    pub summary_token_estimate: usize,
    pub summarization_method: Option<SummarizationMethod>,
}

#[derive(Debug, Clone)]
pub struct WindowedConversation {
    pub system_prompt: String,
    pub context_summary: Option<String>,
    pub recent_messages: Vec<Message>,
    pub meta: WindowMeta,
}

/// Extract the first system message's flattened text, if any.
fn extract_system_prompt(messages: &[Message]) -> (Option<String>, Vec<Message>) {
    let mut system_prompt = None;
    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if system_prompt.is_none() && message.role == Role::System {
            system_prompt = Some(message.content.flatten_text());
        } else {
            rest.push(message.clone());
        }
    }
    (system_prompt, rest)
}

fn needs_windowing(rest: &[Message], all_messages: &[Message], cfg: &WindowingConfig) -> bool {
    if rest.len() > cfg.summarize_threshold {
        return true;
    }
    if let Some(max_tokens) = cfg.max_tokens {
        if estimator::estimate(all_messages) > max_tokens {
            return true;
        }
    }
    false
}

/// Compute the initial token-budget-respecting split point.
fn initial_split(rest: &[Message], cfg: &WindowingConfig) -> usize {
    let mut split = rest.len().saturating_sub(cfg.max_messages);
    if let Some(max_tokens) = cfg.max_tokens {
        while split < rest.len() && estimator::estimate(&rest[split..]) > max_tokens {
            split += 1;
        }
    }
    split.min(rest.len())
}

/// Snap the split point to a conversation boundary, looking back up to 3
/// indices. Never moves the split forward (never keeps fewer messages).
fn snap_to_boundary(rest: &[Message], split: usize) -> usize {
    if split == 0 {
        return split;
    }
    let look_back = split.saturating_sub(3);
    for candidate in (look_back..split).rev() {
        // "immediately after an assistant message" means rest[candidate-1]
        // is assistant, i.e. the split falls right after it.
        if candidate > 0 && rest[candidate - 1].role == Role::Assistant {
            return candidate;
        }
        if rest[candidate].role == Role::User && starts_conversation(&rest[candidate].content.flatten_text()) {
            return candidate;
        }
    }
    split
}

/// Window a conversation.
pub fn window(messages: &[Message], cfg: &WindowingConfig) -> WindowedConversation {
    let original_token_estimate = estimator::estimate(messages);
    let (system_prompt, rest) = extract_system_prompt(messages);
    let system_prompt = system_prompt.unwrap_or_default();

    if !needs_windowing(&rest, messages, cfg) {
        let windowed_token_estimate = estimator::estimate(&rest);
        return WindowedConversation {
            system_prompt,
            context_summary: None,
            recent_messages: rest.clone(),
            meta: WindowMeta {
                original_message_count: messages.len(),
                windowed_message_count: rest.len(),
                trimmed_message_count: 0,
                original_token_estimate,
                windowed_token_estimate,
                summary_token_estimate: 0,
                summarization_method: None,
            },
        };
    }

    let split = initial_split(&rest, cfg);
    let split = snap_to_boundary(&rest, split);

    let older = &rest[..split];
    let recent = rest[split..].to_vec();

    let summary_result = summarizer::summarize(older);
    let (context_summary, method) = match &summary_result.summary {
        Some(s) => (Some(s.clone()), SummarizationMethod::Heuristic),
        None => (None, SummarizationMethod::None),
    };

    // recent token estimate plus the summary's own token cost (not the
    // tokens it saved, which only describes the delta vs `older`).
    let summary_token_estimate = context_summary
        .as_ref()
        .map(|s| estimator::estimate_content(&crate::message::Content::Text(s.clone())))
        .unwrap_or(0);
    let windowed_message_count = recent.len();

    WindowedConversation {
        system_prompt,
        context_summary,
        recent_messages: recent,
        meta: WindowMeta {
            original_message_count: messages.len(),
            windowed_message_count,
            trimmed_message_count: older.len(),
            original_token_estimate,
            windowed_token_estimate: estimator::estimate(&rest[split..]) + summary_token_estimate,
            summary_token_estimate,
            summarization_method: Some(method),
        },
    }
}

/// Rebuild a full message sequence from a windowed conversation.
pub fn build(windowed: &WindowedConversation) -> Vec<Message> {
    let mut out = Vec::with_capacity(windowed.recent_messages.len() + 1);
    if !windowed.system_prompt.is_empty() {
        let mut content = windowed.system_prompt.clone();
        if let Some(summary) = &windowed.context_summary {
            content.push_str("\n\n<context_summary>\n");
            content.push_str(summary);
            content.push_str("\n</context_summary>");
        }
        out.push(Message::system(content));
    }
    out.extend(windowed.recent_messages.iter().cloned());
    out
}
