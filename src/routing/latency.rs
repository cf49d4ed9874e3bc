//! Latency Tracker.
//!
//! Per-model bounded ring buffer of recent samples, each guarded by its own
//! `DashMap` shard lock rather than a single global mutex.

use dashmap::DashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct LatencySample {
    latency_ms: u64,
    #[allow(dead_code)]
    timestamp_ms: i64,
}

#[derive(Debug)]
pub struct LatencyTracker {
    ring_size: usize,
    outlier_threshold_ms: u64,
    samples: DashMap<String, VecDeque<LatencySample>>,
}

impl LatencyTracker {
    pub fn new(ring_size: usize, outlier_threshold_ms: u64) -> Self {
        Self {
            ring_size,
            outlier_threshold_ms,
            samples: DashMap::new(),
        }
    }

    /// `record(model, latencyMs)`. Rejects non-positive or outlier samples.
    pub fn record(&self, model: &str, latency_ms: u64, timestamp_ms: i64) {
        if latency_ms == 0 || latency_ms > self.outlier_threshold_ms {
            return;
        }
        let mut ring = self.samples.entry(model.to_string()).or_default();
        if ring.len() >= self.ring_size {
            ring.pop_front();
        }
        ring.push_back(LatencySample { latency_ms, timestamp_ms });
    }

    fn sorted_latencies(&self, model: &str) -> Vec<u64> {
        let mut v: Vec<u64> = self
            .samples
            .get(model)
            .map(|ring| ring.iter().map(|s| s.latency_ms).collect())
            .unwrap_or_default();
        v.sort_unstable();
        v
    }

    fn percentile(sorted: &[u64], p: f64) -> Option<u64> {
        if sorted.is_empty() {
            return None;
        }
        let rank = ((p * sorted.len() as f64).ceil() as usize).saturating_sub(1);
        Some(sorted[rank.min(sorted.len() - 1)])
    }

    pub fn p50(&self, model: &str) -> Option<u64> {
        Self::percentile(&self.sorted_latencies(model), 0.5)
    }

    pub fn p95(&self, model: &str) -> Option<u64> {
        Self::percentile(&self.sorted_latencies(model), 0.95)
    }

    pub fn mean(&self, model: &str) -> Option<f64> {
        let sorted = self.sorted_latencies(model);
        if sorted.is_empty() {
            return None;
        }
        Some(sorted.iter().sum::<u64>() as f64 / sorted.len() as f64)
    }
}
