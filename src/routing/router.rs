//! Router — the routing precedence chain.
//!
//! Always produces a decision; never fails.

use super::ab::AbTestManager;
use super::budget::BudgetTracker;
use super::pricing::{self, ModelOrTier};
use super::provider;
use crate::classifier::ClassificationResult;
use crate::config::{ComplexityTier, Config};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingReason {
    Routed,
    Pinned,
    LowConfidence,
    RoutingDisabled,
    BudgetExceeded,
    AbVariant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub budget_tokens: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ShadowRecommendation {
    pub would_apply: bool,
    pub recommended_model: String,
    pub recommended_provider: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutingDecision {
    pub original_model: String,
    pub target_model: String,
    pub provider: String,
    pub tier: ComplexityTier,
    pub confidence: f64,
    pub reason: RoutingReason,
    pub thinking: Option<ThinkingConfig>,
    pub headers: HashMap<String, String>,
    pub shadow: ShadowRecommendation,
    pub experiment_id: Option<String>,
    pub variant_id: Option<String>,
}

/// Per-request context the router reads; a subset of the inbound HTTP
/// request plus pipeline-assigned identifiers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub original_model: String,
    /// Lowercased header names, per the inbound handler's contract.
    pub headers: HashMap<String, String>,
    pub run_id: String,
    pub scope: Option<String>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn resolve_provider_and_headers(cfg: &Config, target_model: &str) -> (String, HashMap<String, String>) {
    let resolved = provider::resolve(target_model, &cfg.routing.tier_providers);
    let mut headers = HashMap::new();
    if resolved.provider == "openrouter" {
        headers.extend(cfg.routing.open_router_headers.clone());
    }
    (resolved.provider, headers)
}

fn model_for_variant(cfg: &Config, experiment_id: &str, variant_id: &str) -> Option<String> {
    cfg.ab_experiments
        .iter()
        .find(|e| e.id == experiment_id)
        .and_then(|e| e.variants.iter().find(|v| v.id == variant_id))
        .map(|v| v.model.clone())
}

struct Decision {
    target_model: String,
    reason: RoutingReason,
    experiment_id: Option<String>,
    variant_id: Option<String>,
}

/// The routing precedence chain. First matching clause wins.
#[allow(clippy::too_many_arguments)]
fn decide(
    classification: &ClassificationResult,
    cfg: &Config,
    ctx: &RequestContext,
    original_model: &str,
    original_tokens: usize,
    budget: &BudgetTracker,
    ab: &AbTestManager,
    now_ms: i64,
) -> Decision {
    let passthrough = |reason: RoutingReason| Decision {
        target_model: original_model.to_string(),
        reason,
        experiment_id: None,
        variant_id: None,
    };

    // Step 1: disabled.
    if !cfg.routing.enabled || cfg.routing.tiers.is_empty() {
        return passthrough(RoutingReason::RoutingDisabled);
    }

    // Step 2: pinning by header.
    if let Some(pinned) = ctx.headers.get("x-model-pinned") {
        return Decision {
            target_model: pinned.clone(),
            reason: RoutingReason::Pinned,
            experiment_id: None,
            variant_id: None,
        };
    }

    // Step 3: pinning by config.
    if cfg.routing.pinned_models.contains(original_model) {
        return passthrough(RoutingReason::Pinned);
    }

    // Step 4: downgrade block.
    let original_tier = cfg.routing.tier_of_model(original_model);
    if !cfg.routing.allow_downgrade {
        if let Some(ot) = original_tier {
            if classification.tier < ot {
                return passthrough(RoutingReason::Pinned);
            }
        }
    }

    // Step 5: confidence gate.
    if classification.confidence < cfg.routing.min_confidence {
        return passthrough(RoutingReason::LowConfidence);
    }

    // Step 6: tier lookup.
    let tier_model = match cfg.routing.tier_model(classification.tier) {
        Some(m) => m.to_string(),
        None => return passthrough(RoutingReason::RoutingDisabled),
    };

    // Step 7: budget check.
    if cfg.budget.enabled {
        let scope = ctx.scope.clone().unwrap_or_else(|| "default".to_string());
        let (ceiling, window_ms) = match cfg.budget.scopes.get(&scope) {
            Some(s) => (s.ceiling, s.window_ms),
            None => (cfg.budget.default_ceiling, cfg.budget.default_window_ms),
        };
        let proposed_cost = pricing::estimate_cost(&cfg.routing, &tier_model, original_tokens as u64, None);
        let check = budget.check(&scope, window_ms, ceiling, proposed_cost, now_ms);
        if !check.allowed {
            let fallback = if cfg.routing.allow_downgrade {
                classification
                    .tier
                    .next_cheaper()
                    .and_then(|cheaper| cfg.routing.tier_model(cheaper))
                    .map(str::to_string)
            } else {
                None
            };
            return Decision {
                target_model: fallback.unwrap_or_else(|| original_model.to_string()),
                reason: RoutingReason::BudgetExceeded,
                experiment_id: None,
                variant_id: None,
            };
        }
    }

    // Step 8: A/B override.
    if let Some(assigned) = ab.assign(classification.tier, &ctx.run_id, now_ms) {
        if let Some(model) = model_for_variant(cfg, &assigned.experiment_id, &assigned.variant_id) {
            return Decision {
                target_model: model,
                reason: RoutingReason::AbVariant,
                experiment_id: Some(assigned.experiment_id),
                variant_id: Some(assigned.variant_id),
            };
        }
    }

    // Step 9: routed.
    Decision {
        target_model: tier_model,
        reason: RoutingReason::Routed,
        experiment_id: None,
        variant_id: None,
    }
}

/// `route(classification, cfg, ctx, runId, services)`.
#[allow(clippy::too_many_arguments)]
pub fn route(
    classification: &ClassificationResult,
    cfg: &Config,
    ctx: &RequestContext,
    original_tokens: usize,
    budget: &BudgetTracker,
    ab: &AbTestManager,
    now_ms: i64,
) -> RoutingDecision {
    let original_model = if ctx.original_model.is_empty() {
        "unknown".to_string()
    } else {
        ctx.original_model.clone()
    };
    let confidence = round2(classification.confidence);

    let Decision {
        target_model,
        reason,
        experiment_id,
        variant_id,
    } = decide(classification, cfg, ctx, &original_model, original_tokens, budget, ab, now_ms);

    // A request that actually went out the door consumes its scope's
    // budget, regardless of which precedence clause picked the model —
    // otherwise `accumulated_cost` never grows across requests and the
    // sliding-window ceiling can only ever be tripped by a single
    // over-budget request's own estimated cost (spec §4.9).
    if cfg.budget.enabled {
        let scope = ctx.scope.clone().unwrap_or_else(|| "default".to_string());
        let actual_cost = pricing::estimate_cost(&cfg.routing, &target_model, original_tokens as u64, None);
        budget.record(&scope, actual_cost, now_ms);
    }

    let (provider, headers) = resolve_provider_and_headers(cfg, &target_model);

    let thinking = if classification.tier == ComplexityTier::Reasoning {
        Some(ThinkingConfig {
            kind: "enabled",
            budget_tokens: cfg.routing.reasoning_budget,
        })
    } else {
        None
    };

    let shadow = ShadowRecommendation {
        would_apply: cfg.mode == crate::config::Mode::Active,
        recommended_model: target_model.clone(),
        recommended_provider: provider.clone(),
    };

    RoutingDecision {
        original_model,
        target_model,
        provider,
        tier: classification.tier,
        confidence,
        reason,
        thinking,
        headers,
        shadow,
        experiment_id,
        variant_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TierScores;

    fn classification(tier: ComplexityTier, confidence: f64) -> ClassificationResult {
        ClassificationResult {
            tier,
            confidence,
            reason: "test".to_string(),
            scores: TierScores::default(),
            signals: Vec::new(),
        }
    }

    fn base_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.routing.enabled = true;
        cfg.routing.set_tier_model(ComplexityTier::Simple, "anthropic/haiku");
        cfg.routing.set_tier_model(ComplexityTier::Mid, "anthropic/sonnet");
        cfg.routing.set_tier_model(ComplexityTier::Complex, "anthropic/opus");
        cfg.routing.set_tier_model(ComplexityTier::Reasoning, "anthropic/opus");
        cfg
    }

    fn services() -> (BudgetTracker, AbTestManager) {
        (BudgetTracker::new(), AbTestManager::new(Vec::new(), 10_000).unwrap())
    }

    #[test]
    fn disabled_routing_passes_through() {
        let mut cfg = base_cfg();
        cfg.routing.enabled = false;
        let ctx = RequestContext {
            original_model: "anthropic/opus".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Simple, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::RoutingDisabled);
        assert_eq!(decision.target_model, "anthropic/opus");
    }

    #[test]
    fn pinning_by_config_beats_classification() {
        let mut cfg = base_cfg();
        cfg.routing.pinned_models.insert("anthropic/opus-4".to_string());
        let ctx = RequestContext {
            original_model: "anthropic/opus-4".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Simple, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::Pinned);
        assert_eq!(decision.target_model, "anthropic/opus-4");
    }

    #[test]
    fn pinning_by_header_overrides_tier_lookup() {
        let cfg = base_cfg();
        let mut headers = HashMap::new();
        headers.insert("x-model-pinned".to_string(), "anthropic/custom".to_string());
        let ctx = RequestContext {
            original_model: "anthropic/sonnet".to_string(),
            headers,
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Complex, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::Pinned);
        assert_eq!(decision.target_model, "anthropic/custom");
    }

    #[test]
    fn low_confidence_skips_routing() {
        let mut cfg = base_cfg();
        cfg.routing.min_confidence = 0.4;
        let ctx = RequestContext {
            original_model: "anthropic/sonnet".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Simple, 0.3), &cfg, &ctx, 100, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::LowConfidence);
        assert_eq!(decision.target_model, "anthropic/sonnet");
    }

    #[test]
    fn routes_to_tier_model_on_plain_path() {
        let cfg = base_cfg();
        let ctx = RequestContext {
            original_model: "anthropic/sonnet".to_string(),
            run_id: "run-1".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Simple, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::Routed);
        assert_eq!(decision.target_model, "anthropic/haiku");
    }

    #[test]
    fn reasoning_tier_attaches_thinking_block() {
        let cfg = base_cfg();
        let ctx = RequestContext {
            original_model: "anthropic/opus".to_string(),
            run_id: "run-2".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Reasoning, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        let thinking = decision.thinking.unwrap();
        assert_eq!(thinking.budget_tokens, cfg.routing.reasoning_budget);
    }

    #[test]
    fn downgrade_block_pins_when_disallowed() {
        let mut cfg = base_cfg();
        cfg.routing.allow_downgrade = false;
        let ctx = RequestContext {
            original_model: "anthropic/opus".to_string(),
            run_id: "run-3".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Simple, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::Pinned);
        assert_eq!(decision.target_model, "anthropic/opus");
    }

    #[test]
    fn budget_exceeded_downgrades_to_cheaper_tier() {
        let mut cfg = base_cfg();
        cfg.budget.enabled = true;
        cfg.budget.default_ceiling = 0.0001;
        cfg.routing
            .pricing
            .insert("anthropic/opus".to_string(), crate::config::PricingRate { input_per_1k: 100.0, output_per_1k: 100.0 });
        let ctx = RequestContext {
            original_model: "openai/gpt-4o".to_string(),
            run_id: "run-4".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();
        let decision = route(&classification(ComplexityTier::Complex, 0.9), &cfg, &ctx, 100_000, &budget, &ab, 0);
        assert_eq!(decision.reason, RoutingReason::BudgetExceeded);
        assert_eq!(decision.target_model, "anthropic/sonnet");
    }

    #[test]
    fn routed_requests_accumulate_spend_in_the_budget_tracker() {
        let mut cfg = base_cfg();
        cfg.budget.enabled = true;
        cfg.budget.default_ceiling = 1000.0;
        cfg.budget.default_window_ms = 60_000;
        let ctx = RequestContext {
            original_model: "anthropic/sonnet".to_string(),
            run_id: "run-5".to_string(),
            ..Default::default()
        };
        let (budget, ab) = services();

        route(&classification(ComplexityTier::Simple, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        let first = budget.check("default", 60_000, 1000.0, 0.0, 0);
        route(&classification(ComplexityTier::Simple, 0.9), &cfg, &ctx, 100, &budget, &ab, 0);
        let second = budget.check("default", 60_000, 1000.0, 0.0, 0);

        assert!(second.remaining < first.remaining);
    }
}
