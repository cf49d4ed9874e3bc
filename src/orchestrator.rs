//! Orchestrator — `inferenceOptimize`, the single entry point used by both
//! the sidecar and hook-mode integrations.

use crate::caching::{self, CacheStats};
use crate::classifier::{self, ClassificationResult};
use crate::config::Config;
use crate::estimator;
use crate::message::Message;
use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::routing::ab::AbTestManager;
use crate::routing::budget::BudgetTracker;
use crate::routing::latency::LatencyTracker;
use crate::routing::pricing::{self, ModelOrTier};
use crate::routing::router::{self, RequestContext, RoutingDecision};
use crate::windowing;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

/// Per-request context the orchestrator reads from the inbound request.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorContext {
    pub request_id: String,
    pub original_model: String,
    pub headers: HashMap<String, String>,
    pub run_id: String,
    pub scope: Option<String>,
    pub bypass_optimization: bool,
}

pub struct OrchestratorServices<'a> {
    pub budget: &'a BudgetTracker,
    pub ab: &'a AbTestManager,
    pub latency: &'a LatencyTracker,
    pub collector: Option<&'a dyn MetricsCollector>,
}

#[derive(Debug, Clone)]
pub struct OptimizeResult {
    pub messages: Vec<Message>,
    pub classification: Option<ClassificationResult>,
    pub routing_decision: Option<RoutingDecision>,
    pub metrics: RequestMetrics,
}

fn zero_metrics(request_id: String, now_ms: i64, tokens: usize) -> RequestMetrics {
    RequestMetrics {
        request_id,
        timestamp_ms: now_ms,
        original_tokens: tokens,
        optimized_tokens: tokens,
        tokens_saved: 0,
        windowing_applied: false,
        trimmed_messages: 0,
        summary_tokens: 0,
        tier: None,
        confidence: None,
        routing_reason: None,
        cache_breakpoints_injected: 0,
        windowing_savings_fraction: 0.0,
        routing_savings_fraction: 0.0,
        combined_savings_percent: 0.0,
        latency_ms: 0,
    }
}

fn passthrough(messages: &[Message], request_id: String, now_ms: i64) -> OptimizeResult {
    let tokens = estimator::estimate(messages);
    OptimizeResult {
        messages: messages.to_vec(),
        classification: None,
        routing_decision: None,
        metrics: zero_metrics(request_id, now_ms, tokens),
    }
}

/// Runs the windowing/classification/routing/caching/metrics stages. Panics
/// here are caught by `optimize` and converted into a passthrough result.
fn run_pipeline(messages: &[Message], cfg: &Config, ctx: &OrchestratorContext, services: &OrchestratorServices, now_ms: i64) -> OptimizeResult {
    let original_tokens = estimator::estimate(messages);
    let mut current = messages.to_vec();

    let mut windowing_applied = false;
    let mut trimmed_messages = 0usize;
    let mut summary_tokens = 0usize;
    let mut windowing_savings_fraction = 0.0f64;

    if cfg.windowing.enabled {
        let windowed = windowing::window(&current, &cfg.windowing);
        let rebuilt = windowing::build(&windowed);
        let rebuilt_tokens = estimator::estimate(&rebuilt);
        if rebuilt_tokens < original_tokens {
            windowing_applied = true;
            trimmed_messages = windowed.meta.trimmed_message_count;
            summary_tokens = windowed.meta.summary_token_estimate;
            windowing_savings_fraction = if original_tokens > 0 {
                1.0 - (rebuilt_tokens as f64 / original_tokens as f64)
            } else {
                0.0
            };
            current = rebuilt;
        }
    }

    let mut classification = None;
    let mut routing_decision = None;
    let mut routing_savings_fraction = 0.0f64;

    if cfg.routing.enabled {
        let class = classifier::classify(&current);
        let request_ctx = RequestContext {
            original_model: ctx.original_model.clone(),
            headers: ctx.headers.clone(),
            run_id: ctx.run_id.clone(),
            scope: ctx.scope.clone(),
        };
        let decision = router::route(&class, cfg, &request_ctx, original_tokens, services.budget, services.ab, now_ms);

        if decision.target_model != decision.original_model {
            routing_savings_fraction = pricing::calculate_routing_savings(
                &cfg.routing,
                &ModelOrTier::Model(decision.original_model.clone()),
                decision.tier,
                original_tokens as u64,
            ) / 100.0;
        }

        classification = Some(class);
        routing_decision = Some(decision);
    }

    let mut cache_stats = CacheStats::default();
    if cfg.caching.enabled {
        let annotated = caching::annotate(&current, &cfg.caching);
        current = annotated.messages;
        cache_stats = annotated.stats;
    }

    let optimized_tokens = estimator::estimate(&current);
    let tokens_saved = original_tokens.saturating_sub(optimized_tokens);
    let combined_fraction = 1.0 - (1.0 - windowing_savings_fraction) * (1.0 - routing_savings_fraction);

    let metrics = RequestMetrics {
        request_id: ctx.request_id.clone(),
        timestamp_ms: now_ms,
        original_tokens,
        optimized_tokens,
        tokens_saved,
        windowing_applied,
        trimmed_messages,
        summary_tokens,
        tier: classification.as_ref().map(|c| c.tier),
        confidence: classification.as_ref().map(|c| c.confidence),
        routing_reason: routing_decision.as_ref().map(|d| d.reason),
        cache_breakpoints_injected: cache_stats.breakpoints_injected,
        windowing_savings_fraction,
        routing_savings_fraction,
        combined_savings_percent: combined_fraction * 100.0,
        latency_ms: 0,
    };

    if let Some(collector) = services.collector {
        collector.record(&metrics);
    }

    OptimizeResult {
        messages: current,
        classification,
        routing_decision,
        metrics,
    }
}

/// `inferenceOptimize`. Never raises to the caller: any internal failure
/// degrades to a verbatim passthrough of the original messages with a
/// warning log.
pub fn optimize(messages: &[Message], cfg: &Config, ctx: &OrchestratorContext, services: &OrchestratorServices, now_ms: i64) -> OptimizeResult {
    if !cfg.enabled || ctx.bypass_optimization {
        return passthrough(messages, ctx.request_id.clone(), now_ms);
    }

    let start = now_ms;
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_pipeline(messages, cfg, ctx, services, now_ms)));

    match result {
        Ok(mut optimized) => {
            optimized.metrics.latency_ms = (now_ms - start).max(0) as u64;
            optimized
        }
        Err(_) => {
            tracing::warn!(request_id = %ctx.request_id, "optimization pipeline panicked, falling back to passthrough");
            passthrough(messages, ctx.request_id.clone(), now_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComplexityTier;

    fn services<'a>(budget: &'a BudgetTracker, ab: &'a AbTestManager, latency: &'a LatencyTracker) -> OrchestratorServices<'a> {
        OrchestratorServices {
            budget,
            ab,
            latency,
            collector: None,
        }
    }

    #[test]
    fn globally_disabled_is_a_noop_passthrough() {
        let mut cfg = Config::default();
        cfg.enabled = false;
        let ctx = OrchestratorContext::default();
        let budget = BudgetTracker::new();
        let ab = AbTestManager::new(Vec::new(), 10_000).unwrap();
        let latency = LatencyTracker::new(100, 30_000);
        let messages = vec![Message::user("hello")];
        let result = optimize(&messages, &cfg, &ctx, &services(&budget, &ab, &latency), 0);
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.metrics.tokens_saved, 0);
        assert!(result.classification.is_none());
    }

    #[test]
    fn bypass_flag_skips_optimization() {
        let cfg = Config::default();
        let ctx = OrchestratorContext {
            bypass_optimization: true,
            ..Default::default()
        };
        let budget = BudgetTracker::new();
        let ab = AbTestManager::new(Vec::new(), 10_000).unwrap();
        let latency = LatencyTracker::new(100, 30_000);
        let messages = vec![Message::user("hello")];
        let result = optimize(&messages, &cfg, &ctx, &services(&budget, &ab, &latency), 0);
        assert_eq!(result.messages.len(), 1);
        assert!(result.routing_decision.is_none());
    }

    #[test]
    fn empty_messages_yield_empty_output_and_zero_metrics() {
        let cfg = Config::default();
        let ctx = OrchestratorContext::default();
        let budget = BudgetTracker::new();
        let ab = AbTestManager::new(Vec::new(), 10_000).unwrap();
        let latency = LatencyTracker::new(100, 30_000);
        let result = optimize(&[], &cfg, &ctx, &services(&budget, &ab, &latency), 0);
        assert!(result.messages.is_empty());
        assert_eq!(result.metrics.original_tokens, 0);
        assert_eq!(result.metrics.tokens_saved, 0);
    }

    #[test]
    fn routing_enabled_attaches_tier_and_decision() {
        let mut cfg = Config::default();
        cfg.routing.enabled = true;
        cfg.routing.set_tier_model(ComplexityTier::Simple, "anthropic/haiku");
        cfg.routing.set_tier_model(ComplexityTier::Mid, "anthropic/sonnet");
        cfg.routing.set_tier_model(ComplexityTier::Complex, "anthropic/opus");
        cfg.routing.set_tier_model(ComplexityTier::Reasoning, "anthropic/opus");
        let ctx = OrchestratorContext {
            original_model: "anthropic/sonnet".to_string(),
            run_id: "run-1".to_string(),
            ..Default::default()
        };
        let budget = BudgetTracker::new();
        let ab = AbTestManager::new(Vec::new(), 10_000).unwrap();
        let latency = LatencyTracker::new(100, 30_000);
        let messages = vec![Message::user("Hey there! Thanks, just wanted to say hi")];
        let result = optimize(&messages, &cfg, &ctx, &services(&budget, &ab, &latency), 0);
        assert!(result.classification.is_some());
        assert!(result.routing_decision.is_some());
    }

    #[test]
    fn caching_enabled_marks_system_message() {
        let cfg = Config::default();
        let ctx = OrchestratorContext::default();
        let budget = BudgetTracker::new();
        let ab = AbTestManager::new(Vec::new(), 10_000).unwrap();
        let latency = LatencyTracker::new(100, 30_000);
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let result = optimize(&messages, &cfg, &ctx, &services(&budget, &ab, &latency), 0);
        assert!(result.metrics.cache_breakpoints_injected >= 1);
        assert!(result.messages[0].cache_control.is_some());
    }
}
