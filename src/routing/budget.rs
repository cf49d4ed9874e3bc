//! Budget Tracker.
//!
//! Per-scope sliding-window cost ceiling. Each scope's state is serialized
//! under its own `DashMap` shard lock rather than a single global mutex
//! (enrichment dependency, see DESIGN.md).

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct BudgetState {
    window_start_ms: i64,
    accumulated_cost: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BudgetCheck {
    pub allowed: bool,
    pub remaining: f64,
}

#[derive(Debug, Default)]
pub struct BudgetTracker {
    scopes: DashMap<String, BudgetState>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `check(scope, windowMs, ceiling, proposedCost)`.
    pub fn check(&self, scope: &str, window_ms: u64, ceiling: f64, proposed_cost: f64, now_ms: i64) -> BudgetCheck {
        let mut entry = self.scopes.entry(scope.to_string()).or_insert(BudgetState {
            window_start_ms: now_ms,
            accumulated_cost: 0.0,
        });

        if now_ms - entry.window_start_ms >= window_ms as i64 {
            entry.window_start_ms = now_ms;
            entry.accumulated_cost = 0.0;
        }

        let projected = entry.accumulated_cost + proposed_cost;
        let allowed = projected <= ceiling;
        BudgetCheck {
            allowed,
            remaining: (ceiling - entry.accumulated_cost).max(0.0),
        }
    }

    /// `record(scope, actualCost)`.
    pub fn record(&self, scope: &str, actual_cost: f64, now_ms: i64) {
        let mut entry = self.scopes.entry(scope.to_string()).or_insert(BudgetState {
            window_start_ms: now_ms,
            accumulated_cost: 0.0,
        });
        entry.accumulated_cost += actual_cost;
    }
}
