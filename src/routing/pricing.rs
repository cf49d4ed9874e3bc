//! Pricing.
//!
//! Cost estimation with tier-based fallback when a model has no pricing
//! entry, keyed by exact model id with a tier default.

use crate::config::{ComplexityTier, PricingRate, RoutingConfig};

/// Either a concrete model id or a tier, used as the "from" side of a
/// `calculateRoutingSavings` call.
#[derive(Debug, Clone)]
pub enum ModelOrTier {
    Model(String),
    Tier(ComplexityTier),
}

/// Compiled-in default rate per tier, used when a model has no explicit
/// entry in `cfg.pricing` and cannot be mapped back to a tier via
/// `cfg.routing.tiers`. Dollars per 1k tokens.
fn default_tier_rate(tier: ComplexityTier) -> PricingRate {
    match tier {
        ComplexityTier::Simple => PricingRate {
            input_per_1k: 0.0008,
            output_per_1k: 0.004,
        },
        ComplexityTier::Mid => PricingRate {
            input_per_1k: 0.003,
            output_per_1k: 0.015,
        },
        ComplexityTier::Complex => PricingRate {
            input_per_1k: 0.005,
            output_per_1k: 0.025,
        },
        ComplexityTier::Reasoning => PricingRate {
            input_per_1k: 0.015,
            output_per_1k: 0.075,
        },
    }
}

/// Resolve a pricing rate for a model id: exact table match, else fallback
/// via tier inference (`complex` tier default), unless the model itself
/// maps to a known tier target.
fn rate_for_model(cfg: &RoutingConfig, model_id: &str) -> PricingRate {
    if let Some(rate) = cfg.pricing.get(model_id) {
        return *rate;
    }
    match cfg.tier_of_model(model_id) {
        Some(tier) => default_tier_rate(tier),
        None => default_tier_rate(ComplexityTier::Complex),
    }
}

fn rate_for(cfg: &RoutingConfig, target: &ModelOrTier) -> PricingRate {
    match target {
        ModelOrTier::Model(model_id) => rate_for_model(cfg, model_id),
        ModelOrTier::Tier(tier) => cfg
            .tier_model(*tier)
            .and_then(|model| cfg.pricing.get(model).copied())
            .unwrap_or_else(|| default_tier_rate(*tier)),
    }
}

/// `estimateCost(modelId, inputTokens, outputTokens?)`. When
/// `output_tokens` is not supplied, only input cost is charged — zero is
/// the conservative, never-overestimate-savings choice.
pub fn estimate_cost(cfg: &RoutingConfig, model_id: &str, input_tokens: u64, output_tokens: Option<u64>) -> f64 {
    let rate = rate_for_model(cfg, model_id);
    let input_cost = (input_tokens as f64 / 1000.0) * rate.input_per_1k;
    let output_cost = output_tokens.unwrap_or(0) as f64 / 1000.0 * rate.output_per_1k;
    input_cost + output_cost
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `calculateRoutingSavings(fromModelOrTier, toTier)`. Uses an 80/20
/// input/output split over `tokens` to price both sides.
pub fn calculate_routing_savings(cfg: &RoutingConfig, from: &ModelOrTier, to_tier: ComplexityTier, tokens: u64) -> f64 {
    let from_tier = match from {
        ModelOrTier::Tier(t) => Some(*t),
        ModelOrTier::Model(m) => cfg.tier_of_model(m),
    };
    if from_tier == Some(to_tier) {
        return 0.0;
    }

    let input_tokens = (tokens as f64 * 0.8) as u64;
    let output_tokens = (tokens as f64 * 0.2) as u64;

    let from_rate = rate_for(cfg, from);
    let to_rate = rate_for(cfg, &ModelOrTier::Tier(to_tier));

    let from_cost = (input_tokens as f64 / 1000.0) * from_rate.input_per_1k + (output_tokens as f64 / 1000.0) * from_rate.output_per_1k;
    let to_cost = (input_tokens as f64 / 1000.0) * to_rate.input_per_1k + (output_tokens as f64 / 1000.0) * to_rate.output_per_1k;

    if from_cost == 0.0 {
        return 0.0;
    }

    round2((from_cost - to_cost) / from_cost * 100.0)
}
