//! A/B Test Manager.
//!
//! Deterministic variant assignment via a portable FNV-1a hash of `runId`
//! (not a language-default hasher, whose seed varies across process runs),
//! with Kahan-compensated running aggregates to bound floating-point drift
//! over long sample runs. Per-entity state lives in `DashMap`s rather than
//! one global mutex (see DESIGN.md).

use crate::config::{ABExperimentConfig, ComplexityTier, ExperimentStatus};
use anyhow::{bail, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Portable FNV-1a hash, deterministic across process runs and platforms
/// (unlike `std::collections::hash_map::RandomState`).
fn fnv1a(s: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn bucket_for(run_id: &str) -> u32 {
    (fnv1a(run_id) % 100) as u32
}

/// Kahan (compensated) summation accumulator.
#[derive(Debug, Clone, Copy, Default)]
struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub latency_ms: u64,
    pub cost: f64,
    pub output_tokens: u64,
}

#[derive(Debug, Default)]
struct VariantAggregate {
    count: u64,
    latency: KahanSum,
    cost: KahanSum,
    output_tokens: KahanSum,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VariantResult {
    pub variant_id: String,
    pub count: u64,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    pub avg_output_tokens: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExperimentResults {
    pub variants: Vec<VariantResult>,
    pub significant: bool,
}

#[derive(Debug, Clone)]
struct Assignment {
    experiment_id: String,
    variant_id: String,
    timestamp_ms: i64,
}

/// `{experimentId, variantId}` returned by `assign`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Assigned {
    pub experiment_id: String,
    pub variant_id: String,
}

pub struct AbTestManager {
    experiments: Vec<ABExperimentConfig>,
    max_pending: usize,
    pending: DashMap<String, Assignment>,
    pending_order: Mutex<VecDeque<String>>,
    aggregates: DashMap<(String, String), VariantAggregate>,
}

impl AbTestManager {
    /// Construction validates that every experiment's variant weights sum
    /// to exactly 100. Fails construction otherwise.
    pub fn new(experiments: Vec<ABExperimentConfig>, max_pending: usize) -> Result<Self> {
        for experiment in &experiments {
            let total: u32 = experiment.variants.iter().map(|v| v.weight as u32).sum();
            if total != 100 {
                bail!(
                    "experiment '{}' variant weights sum to {} (must be 100)",
                    experiment.id,
                    total
                );
            }
        }
        Ok(Self {
            experiments,
            max_pending,
            pending: DashMap::new(),
            pending_order: Mutex::new(VecDeque::new()),
            aggregates: DashMap::new(),
        })
    }

    fn evict_if_over_capacity(&self) {
        if self.pending.len() <= self.max_pending {
            return;
        }
        let target = (self.max_pending * 80) / 100;
        let mut order = self.pending_order.lock().unwrap();
        while self.pending.len() > target {
            match order.pop_front() {
                Some(run_id) => {
                    self.pending.remove(&run_id);
                }
                None => break,
            }
        }
    }

    /// `assign(tier, runId)`. Idempotent: the same `runId` always yields
    /// the same variant until `recordOutcome` clears it.
    pub fn assign(&self, tier: ComplexityTier, run_id: &str, now_ms: i64) -> Option<Assigned> {
        if let Some(existing) = self.pending.get(run_id) {
            return Some(Assigned {
                experiment_id: existing.experiment_id.clone(),
                variant_id: existing.variant_id.clone(),
            });
        }

        let mut candidates: Vec<&ABExperimentConfig> = self
            .experiments
            .iter()
            .filter(|e| e.tier == tier && e.status == ExperimentStatus::Active)
            .collect();
        candidates.sort_by_key(|e| std::cmp::Reverse(e.started_at_ms));
        let experiment = candidates.first()?;

        let bucket = bucket_for(run_id);
        let mut cumulative = 0u32;
        let mut chosen = experiment.variants.first()?;
        for variant in &experiment.variants {
            cumulative += variant.weight as u32;
            if (bucket as u32) < cumulative {
                chosen = variant;
                break;
            }
        }

        let assignment = Assignment {
            experiment_id: experiment.id.clone(),
            variant_id: chosen.id.clone(),
            timestamp_ms: now_ms,
        };
        self.pending.insert(run_id.to_string(), assignment.clone());
        self.pending_order.lock().unwrap().push_back(run_id.to_string());
        self.evict_if_over_capacity();

        Some(Assigned {
            experiment_id: assignment.experiment_id,
            variant_id: assignment.variant_id,
        })
    }

    /// `recordOutcome(runId, {...})`. No-op on unknown `runId`.
    pub fn record_outcome(&self, run_id: &str, outcome: Outcome) {
        let assignment = match self.pending.remove(run_id) {
            Some((_, a)) => a,
            None => return,
        };
        let key = (assignment.experiment_id, assignment.variant_id);
        let mut aggregate = self.aggregates.entry(key).or_default();
        aggregate.count += 1;
        aggregate.latency.add(outcome.latency_ms as f64);
        aggregate.cost.add(outcome.cost);
        aggregate.output_tokens.add(outcome.output_tokens as f64);
    }

    /// `cleanupStaleAssignments(ttlMs)`.
    pub fn cleanup_stale_assignments(&self, ttl_ms: i64, now_ms: i64) {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| now_ms - entry.timestamp_ms >= ttl_ms)
            .map(|entry| entry.key().clone())
            .collect();
        for run_id in stale {
            self.pending.remove(&run_id);
        }
    }

    /// `getResults(experimentId)`. Significance: every variant has reached
    /// `minSamples` and the spread between the highest and lowest average
    /// cost exceeds 1% of the lowest — a simple two-sample separation test.
    pub fn get_results(&self, experiment_id: &str) -> ExperimentResults {
        let experiment = self.experiments.iter().find(|e| e.id == experiment_id);
        let variants = match experiment {
            Some(e) => e.variants.clone(),
            None => Vec::new(),
        };

        let mut results = Vec::with_capacity(variants.len());
        for variant in &variants {
            let key = (experiment_id.to_string(), variant.id.clone());
            let aggregate = self.aggregates.get(&key);
            let (count, avg_latency_ms, avg_cost, avg_output_tokens) = match aggregate {
                Some(a) if a.count > 0 => (
                    a.count,
                    a.latency.sum / a.count as f64,
                    a.cost.sum / a.count as f64,
                    a.output_tokens.sum / a.count as f64,
                ),
                _ => (0, 0.0, 0.0, 0.0),
            };
            results.push(VariantResult {
                variant_id: variant.id.clone(),
                count,
                avg_latency_ms,
                avg_cost,
                avg_output_tokens,
            });
        }

        let min_samples = experiment.map(|e| e.min_samples).unwrap_or(u64::MAX);
        let all_reached_samples = !results.is_empty() && results.iter().all(|r| r.count >= min_samples);
        let significant = if all_reached_samples {
            let costs: Vec<f64> = results.iter().map(|r| r.avg_cost).collect();
            let min_cost = costs.iter().cloned().fold(f64::INFINITY, f64::min);
            let max_cost = costs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            min_cost > 0.0 && (max_cost - min_cost) / min_cost > 0.01
        } else {
            false
        };

        ExperimentResults { variants: results, significant }
    }
}
