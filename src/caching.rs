//! Cache Breakpoint Annotator.
//!
//! Marks messages with `cache_control = {type: "ephemeral"}` as hints to the
//! upstream provider about cache boundaries. Never mutates inputs.

use crate::config::CachingConfig;
use crate::message::Message;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub breakpoints_injected: usize,
    pub eligible_messages: usize,
}

#[derive(Debug, Clone)]
pub struct AnnotatedConversation {
    pub messages: Vec<Message>,
    pub stats: CacheStats,
}

fn content_len(message: &Message) -> usize {
    message.content.char_len()
}

/// Annotate a conversation with cache breakpoints.
pub fn annotate(messages: &[Message], cfg: &CachingConfig) -> AnnotatedConversation {
    if !cfg.enabled {
        return AnnotatedConversation {
            messages: messages.to_vec(),
            stats: CacheStats::default(),
        };
    }

    let total = messages.len();
    let mut out = Vec::with_capacity(total);
    let mut breakpoints_injected = 0usize;
    let mut eligible_messages = 0usize;

    for (index, message) in messages.iter().enumerate() {
        let already_marked = message.cache_control.is_some();

        let eligible = message.role == crate::message::Role::System
            || content_len(message) >= cfg.min_content_length
            || (total >= 3 && index == total - 2);

        if eligible {
            eligible_messages += 1;
        }

        if already_marked {
            out.push(message.clone());
            continue;
        }

        if eligible && cfg.inject_breakpoints {
            out.push(message.with_cache_breakpoint());
            breakpoints_injected += 1;
        } else {
            out.push(message.clone());
        }
    }

    AnnotatedConversation {
        messages: out,
        stats: CacheStats {
            breakpoints_injected,
            eligible_messages,
        },
    }
}
