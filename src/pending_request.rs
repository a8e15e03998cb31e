//! One queued invocation awaiting a free worker (spec §3 "PendingRequest").
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::delegate::InvokeResponse;
use crate::error::BrokerError;

pub type PendingOutcome = Result<InvokeResponse, BrokerError>;

/// A single queued invocation: immutable input, arrival timestamp, and a
/// single-shot completion channel guarded by an atomic `available` flag so
/// that at most one of {resolve, reject} ever fires (spec invariant, §3 and
/// §8 property 3). The deadline timer itself is owned by
/// [`crate::broker::WorkerBroker`] (it needs the broker's queue to evict the
/// entry on fire); this type only exposes the race-free terminal transition.
pub struct PendingRequest {
    pub request_id: String,
    pub input: Vec<u8>,
    pub deadline_epoch_ms: u64,
    pub debugger_tag: Option<String>,
    arrival: Instant,
    available: AtomicBool,
    completion: Mutex<Option<oneshot::Sender<PendingOutcome>>>,
}

impl PendingRequest {
    #[must_use]
    pub fn new(
        request_id: String,
        input: Vec<u8>,
        deadline_epoch_ms: u64,
        debugger_tag: Option<String>,
    ) -> (Self, oneshot::Receiver<PendingOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request_id,
                input,
                deadline_epoch_ms,
                debugger_tag,
                arrival: Instant::now(),
                available: AtomicBool::new(true),
                completion: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Milliseconds elapsed since arrival — the `queueing` measurement.
    #[must_use]
    pub fn wait_ms(&self) -> u64 {
        u64::try_from(self.arrival.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Attempt the terminal transition. Returns `true` iff this call won the
    /// race against a concurrent timeout/fast-fail/dispatch and therefore
    /// actually delivered `result` to the caller.
    pub fn try_complete(&self, result: PendingOutcome) -> bool {
        if self
            .available
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut guard = self.completion.lock().unwrap();
        if let Some(tx) = guard.take() {
            drop(tx.send(result));
        }
        true
    }
}
