//! Control-plane mirror of per-broker worker stats (spec §3 "StateManager /
//! BrokerView", §6 "`BrokerStats` JSON shape").
use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// One bound worker as reported into the control plane. Serializes to the
/// `{ name, activeRequestCount }` shape spec §6 describes for monitoring
/// consumers — `name` there is the worker's *credential*, not its display
/// name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStat {
    #[serde(rename = "name")]
    pub credential: String,
    pub active_request_count: u32,
}

/// Aggregated view of one function's broker, as reported by the data plane
/// and consumed by [`super::capacity::CapacityManager`] and
/// [`super::controller::DefaultController`]. Serializes to the wire shape
/// described in spec §6.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    #[serde(rename = "functionName")]
    pub function: String,
    pub queue_depth: usize,
    pub worker_count: usize,
    pub workers: Vec<WorkerStat>,
    /// Warm-worker floor below which autoscale shrink must not go.
    #[serde(default)]
    pub reservation_count: u32,
    /// Whether this broker belongs to an inspector (debugger-attached)
    /// function. Inspector brokers are never autoscale shrink candidates
    /// (spec §4.4.3).
    #[serde(default, rename = "inspector")]
    pub is_inspector: bool,
    /// Consecutive autoscale cycles this broker was observed idle. Reported
    /// by the data plane; informational only in this crate (a capacity
    /// manager implementation may use it as a shrink-eligibility input).
    #[serde(default)]
    pub redundant_times: u32,
    /// Per-function victim-selection strategy override reported dynamically
    /// by the data plane (as opposed to the statically configured
    /// `FunctionProfile::shrink_strategy`) — a raw name rather than the
    /// typed `ShrinkStrategy` enum, since it can arrive from outside this
    /// crate's own config loader. An unrecognized name falls back to LCC
    /// with a warning (spec §4.4.4, §7) — see
    /// [`super::shrink_strategy::select_victims`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shrink_strategy_override: Option<String>,
}

/// A `BrokerStats` snapshot, read-only from the controller's perspective.
pub type BrokerView = BrokerStats;

/// Process-wide registry of the latest [`BrokerStats`] reported per
/// function. Plain `std::sync::Mutex`: every access here is a short,
/// non-blocking map operation, never held across an `.await`.
#[derive(Debug, Default)]
pub struct StateManager {
    views: Mutex<HashMap<String, BrokerStats>>,
}

impl StateManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored view for `stats.function` with the latest report.
    pub fn report(&self, stats: BrokerStats) {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut views = self.views.lock().unwrap();
        views.insert(stats.function.clone(), stats);
    }

    #[must_use]
    pub fn get(&self, function: &str) -> Option<BrokerStats> {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let views = self.views.lock().unwrap();
        views.get(function).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<BrokerStats> {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let views = self.views.lock().unwrap();
        views.values().cloned().collect()
    }
}
