//! Per-request and process-wide metrics.

use crate::config::ComplexityTier;
use crate::routing::RoutingReason;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A single request's metrics record, assembled by the orchestrator and
/// handed to a collector if one is configured.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestMetrics {
    pub request_id: String,
    pub timestamp_ms: i64,
    pub original_tokens: usize,
    pub optimized_tokens: usize,
    pub tokens_saved: usize,
    pub windowing_applied: bool,
    pub trimmed_messages: usize,
    pub summary_tokens: usize,
    pub tier: Option<ComplexityTier>,
    pub confidence: Option<f64>,
    pub routing_reason: Option<RoutingReason>,
    pub cache_breakpoints_injected: usize,
    pub windowing_savings_fraction: f64,
    pub routing_savings_fraction: f64,
    pub combined_savings_percent: f64,
    pub latency_ms: u64,
}

/// A sink for per-request metrics. The host owns persistence; this trait
/// only describes the handoff.
pub trait MetricsCollector: Send + Sync {
    fn record(&self, metrics: &RequestMetrics);
}

/// Process-wide running totals, backing the CLI status block.
#[derive(Debug, Default)]
pub struct Totals {
    requests: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cache_reads: AtomicU64,
    cache_writes: AtomicU64,
    savings_sum_percent: Mutex<f64>,
}

impl Totals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, metrics: &RequestMetrics) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.input_tokens.fetch_add(metrics.original_tokens as u64, Ordering::Relaxed);
        self.output_tokens.fetch_add(metrics.optimized_tokens as u64, Ordering::Relaxed);
        self.cache_writes.fetch_add(metrics.cache_breakpoints_injected as u64, Ordering::Relaxed);
        let mut savings = self.savings_sum_percent.lock().unwrap();
        *savings += metrics.combined_savings_percent;
    }

    pub fn record_cache_read(&self) {
        self.cache_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TotalsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let savings_sum = *self.savings_sum_percent.lock().unwrap();
        TotalsSnapshot {
            requests,
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            cache_reads: self.cache_reads.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            average_savings_percent: if requests > 0 { savings_sum / requests as f64 } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TotalsSnapshot {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_reads: u64,
    pub cache_writes: u64,
    pub average_savings_percent: f64,
}
