//! Conversation message types.
//!
//! Messages are immutable pipeline inputs: every stage produces new message
//! sequences rather than mutating in place (invariant carried throughout
//! `windowing`, `caching`, and `orchestrator`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single opaque content block, e.g. `{"type": "text", "text": "..."}` or
/// `{"type": "image", ...}`. Only `text` blocks carry a `text` field the
/// pipeline reads; all other fields pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: Some(s.into()),
            extra: HashMap::new(),
        }
    }

    fn text_len(&self) -> usize {
        match &self.text {
            Some(t) => t.len(),
            None => serde_json::to_string(&self.extra).map(|s| s.len()).unwrap_or(0),
        }
    }
}

/// Content is either a plain string or an ordered sequence of blocks.
/// These shapes are mutually exclusive on the wire, so a sum type (not an
/// all-optional struct) is the right representation here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Flatten to a single string: blocks are concatenated by their `text`
    /// field (non-text blocks contribute nothing to the flattened text).
    pub fn flatten_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Total character length used by the token estimator and cache
    /// annotator: string length, or sum of block contributions.
    pub fn char_len(&self) -> usize {
        match self {
            Content::Text(s) => s.chars().count(),
            Content::Blocks(blocks) => blocks.iter().map(|b| b.text_len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// Count of non-text blocks (used by the token estimator's per-block
    /// overhead).
    pub fn non_text_block_count(&self) -> usize {
        match self {
            Content::Text(_) => 0,
            Content::Blocks(blocks) => blocks.iter().filter(|b| b.text.is_none()).count(),
        }
    }

    pub fn has_code_block(&self) -> bool {
        self.flatten_text().contains("```") || self.flatten_text().contains('`')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub control_type: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            control_type: "ephemeral".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
            tool_calls: None,
            cache_control: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// A message rewritten with a `cache_control` breakpoint, leaving a
    /// pre-existing annotation untouched (invariant 3: never two marks).
    pub fn with_cache_breakpoint(&self) -> Self {
        let mut m = self.clone();
        if m.cache_control.is_none() {
            m.cache_control = Some(CacheControl::ephemeral());
        }
        m
    }
}

/// Patterns that mark the start of a fresh conversational turn, used by the
/// windower's conversation-boundary snap.
pub const CONVERSATION_STARTERS: &[&str] =
    &["hi", "hello", "can you help", "i need", "let's", "new task"];

pub fn starts_conversation(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    CONVERSATION_STARTERS.iter().any(|p| lower.starts_with(p))
}
