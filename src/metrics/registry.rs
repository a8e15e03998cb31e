use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::debug;

use super::histogram::LatencyHistogram;

/// Process-wide queueing metrics, tagged by function name.
///
/// `queuedRequestCounter` is a lock-free atomic per function; the wait-time
/// histograms share one mutex since they are only touched on the (already
/// serialized, per spec §5) broker-queue slow path.
#[derive(Debug, Default)]
pub struct Metrics {
    queued_counters: Mutex<HashMap<String, AtomicU64>>,
    wait_histograms: Mutex<HashMap<String, LatencyHistogram>>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one enqueue for `function_name` (`queuedRequestCounter`).
    pub fn record_enqueue(&self, function_name: &str) {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut counters = self.queued_counters.lock().unwrap();
        counters
            .entry(function_name.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn enqueue_count(&self, function_name: &str) -> u64 {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let counters = self.queued_counters.lock().unwrap();
        counters
            .get(function_name)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Record a queued-wait duration for `function_name`
    /// (`queuedRequestDurationHistogram`).
    pub fn record_wait(&self, function_name: &str, wait_ms: u64) {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut histograms = self.wait_histograms.lock().unwrap();
        let entry = histograms
            .entry(function_name.to_owned())
            .or_insert_with(LatencyHistogram::default);
        if let Err(err) = entry.record(wait_ms) {
            debug!("failed to record wait histogram for {function_name}: {err}");
        }
    }

    #[must_use]
    pub fn wait_percentiles(&self, function_name: &str) -> Option<(u64, u64, u64)> {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let histograms = self.wait_histograms.lock().unwrap();
        histograms.get(function_name).map(LatencyHistogram::percentiles)
    }
}
