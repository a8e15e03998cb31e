//! Expand/shrink sizing, bounded by a global memory budget (spec §4.5
//! "CapacityManager").
use std::collections::HashMap;

use super::state::BrokerStats;

/// Per-function worker-count adjustment computed by a [`CapacityManager`]
/// pass. The controller interprets `expand` as "launch this many more
/// workers" and `shrink` as "retire this many", never both in the same
/// pass for a given function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delta {
    pub expand: u32,
    pub shrink: u32,
}

/// Decides how many workers to add or remove per function from the
/// aggregated [`BrokerStats`] view, bounded by whatever capacity policy the
/// implementation enforces (spec §4.5). Interface only beyond the one
/// concrete [`BudgetedCapacityManager`] below — callers may supply a richer
/// policy (bin-packing, per-tenant quotas, ...).
pub trait CapacityManager: Send + Sync {
    /// Whether expanding `function` by one worker is currently permitted,
    /// given the other functions' aggregated usage in `views`. Called on
    /// every `RequestQueueing` event, so it must be cheap and synchronous.
    fn allow_expanding_on_request_queueing(&self, function: &str, views: &[BrokerStats]) -> bool;

    /// Compute one autoscale pass's per-function deltas from the full
    /// aggregated view.
    fn evaluate_scale_deltas(&self, views: &[BrokerStats]) -> HashMap<String, Delta>;
}

/// A [`CapacityManager`] bounded by a fixed virtual-memory budget: each
/// function is assigned a fixed per-worker memory cost, and expansion is
/// only allowed while the sum of `worker_count * cost` across all known
/// functions stays under `virtual_memory_pool_size_mb`. Shrink retires idle
/// workers (no queue pressure) down to each function's reservation floor.
///
/// This is the one concrete policy this crate ships so it is usable without
/// a caller-supplied `CapacityManager` (spec §4.5); it is deliberately
/// simple — no bin-packing, no per-tenant fairness.
#[derive(Debug, Clone)]
pub struct BudgetedCapacityManager {
    virtual_memory_pool_size_mb: u64,
    memory_cost_mb: HashMap<String, u64>,
    default_memory_cost_mb: u64,
}

impl BudgetedCapacityManager {
    #[must_use]
    pub fn new(virtual_memory_pool_size_mb: u64, memory_cost_mb: HashMap<String, u64>) -> Self {
        Self {
            virtual_memory_pool_size_mb,
            memory_cost_mb,
            default_memory_cost_mb: 128,
        }
    }

    fn memory_cost(&self, function: &str) -> u64 {
        self.memory_cost_mb.get(function).copied().unwrap_or(self.default_memory_cost_mb)
    }

    fn total_used_mb(&self, views: &[BrokerStats]) -> u64 {
        views
            .iter()
            .map(|view| self.memory_cost(&view.function).saturating_mul(view.worker_count as u64))
            .fold(0u64, |total, used| total.saturating_add(used))
    }
}

impl CapacityManager for BudgetedCapacityManager {
    fn allow_expanding_on_request_queueing(&self, function: &str, views: &[BrokerStats]) -> bool {
        let used = self.total_used_mb(views);
        let projected = used.saturating_add(self.memory_cost(function));
        projected <= self.virtual_memory_pool_size_mb
    }

    fn evaluate_scale_deltas(&self, views: &[BrokerStats]) -> HashMap<String, Delta> {
        let mut deltas = HashMap::with_capacity(views.len());
        for view in views {
            let delta = if view.queue_depth > 0 {
                let expand = u32::from(self.allow_expanding_on_request_queueing(&view.function, views));
                Delta { expand, shrink: 0 }
            } else {
                let worker_count = u32::try_from(view.worker_count).unwrap_or(u32::MAX);
                let shrink = worker_count.saturating_sub(view.reservation_count);
                Delta { expand: 0, shrink }
            };
            if delta != Delta::default() {
                deltas.insert(view.function.clone(), delta);
            }
        }
        deltas
    }
}
