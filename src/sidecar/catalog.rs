//! Virtual model catalogue.
//!
//! IDs parse as `<provider>/<modelName>`; `provider == "slimclaw"` marks a
//! model as virtual — it resolves dynamically to a concrete downstream
//! model per request instead of naming one directly.

pub const VIRTUAL_PROVIDER: &str = "slimclaw";
pub const AUTO_MODEL_ID: &str = "slimclaw/auto";

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct VirtualModel {
    pub id: &'static str,
    pub reasoning: bool,
    pub input_modalities: &'static [&'static str],
    pub context_window: u64,
    pub max_tokens: u64,
}

/// Capability superset advertised for `slimclaw/auto`. Cost is dynamic
/// (resolved per request) and is therefore not part of this static record.
pub const AUTO: VirtualModel = VirtualModel {
    id: AUTO_MODEL_ID,
    reasoning: true,
    input_modalities: &["text", "image"],
    context_window: 200_000,
    max_tokens: 16_384,
};

pub fn is_virtual(model_id: &str) -> bool {
    model_id
        .split_once('/')
        .is_some_and(|(provider, _)| provider == VIRTUAL_PROVIDER)
}
