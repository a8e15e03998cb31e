//! A handle onto one running worker process (spec §3/§4.2 "Worker").
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use tokio::sync::Notify;

use crate::broker::WorkerBroker;
use crate::delegate::{Delegate, InvokeRequest};
use crate::error::BrokerError;
use crate::pending_request::{PendingOutcome, PendingRequest};

/// One bound worker process. Lives behind `Arc` — the broker owns workers
/// via its credential map, and `pipe`'s drain-completion task holds a weak
/// clone to notify `activeRequestCount` reaching zero without keeping the
/// worker alive past removal.
#[derive(Debug)]
pub struct Worker {
    pub name: String,
    pub credential: String,
    pub disposable: bool,
    pub register_time: Instant,
    active_request_count: AtomicU32,
    traffic_off: AtomicBool,
    idle_notify: Notify,
    served_count: AtomicU32,
    broker: Mutex<Option<Weak<WorkerBroker>>>,
}

impl Worker {
    #[must_use]
    pub fn new(name: String, credential: String, disposable: bool) -> Self {
        Self {
            name,
            credential,
            disposable,
            register_time: Instant::now(),
            active_request_count: AtomicU32::new(0),
            traffic_off: AtomicBool::new(false),
            idle_notify: Notify::new(),
            served_count: AtomicU32::new(0),
            broker: Mutex::new(None),
        }
    }

    /// Bind this worker to the broker that owns it, so a post-request
    /// free-transition can re-invoke `tryConsumeQueue` (spec §4.3.3) without
    /// the worker holding a strong, cycle-forming reference back to its
    /// owner.
    pub fn set_broker(&self, broker: Weak<WorkerBroker>) {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let mut guard = self.broker.lock().unwrap();
        *guard = Some(broker);
    }

    fn broker_handle(&self) -> Option<Arc<WorkerBroker>> {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        let guard = self.broker.lock().unwrap();
        guard.as_ref().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn active_request_count(&self) -> u32 {
        self.active_request_count.load(Ordering::Acquire)
    }

    /// Count of `pipe` calls dispatched to this worker so far, regardless of
    /// outcome — operational visibility alongside the queued-wait histogram
    /// (spec §4.2 ambient extension; see `SPEC_FULL.md`).
    #[must_use]
    pub fn served_count(&self) -> u32 {
        self.served_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn traffic_off(&self) -> bool {
        self.traffic_off.load(Ordering::Acquire)
    }

    /// `!trafficOff ∧ activeRequestCount < maxActivateRequests` (spec §3).
    #[must_use]
    pub fn is_worker_free(&self, max_activate_requests: u32) -> bool {
        !self.traffic_off() && self.active_request_count() < max_activate_requests
    }

    /// Forward `request` to the worker process via `delegate`.
    ///
    /// Pre-increments `activeRequestCount` and `served_count` before the
    /// delegate call; post-decrements `activeRequestCount` only after the
    /// response body is fully drained (`response.finish` resolves), which
    /// happens on a detached task so `pipe` itself returns as soon as the
    /// delegate answers. Reaching zero wakes any [`Worker::close_traffic`]
    /// waiter. Emits a `tracing` event tagged with `credential`,
    /// `worker_name`, and the measured `queueing_ms` on both outcomes.
    pub async fn pipe(self: &Arc<Self>, delegate: &dyn Delegate, request: &PendingRequest) -> PendingOutcome {
        self.active_request_count.fetch_add(1, Ordering::AcqRel);
        self.served_count.fetch_add(1, Ordering::Relaxed);

        if self.disposable && request.debugger_tag.is_some() {
            if let Err(err) = delegate.inspector_start(&self.credential).await {
                self.decrement_and_notify();
                return Err(BrokerError::Delegate(err));
            }
        }

        let invoke_request = InvokeRequest {
            request_id: request.request_id.clone(),
            input: request.input.clone(),
            deadline_epoch_ms: request.deadline_epoch_ms,
            debugger_tag: request.debugger_tag.clone(),
        };
        let queueing_ms = request.wait_ms();

        match delegate.trigger(&self.credential, invoke_request).await {
            Ok(mut response) => {
                response.queueing_ms = queueing_ms;
                response.worker_name = self.name.clone();
                tracing::debug!(
                    credential = %self.credential,
                    worker_name = %self.name,
                    queueing_ms,
                    "worker dispatched request"
                );
                let (placeholder_tx, placeholder_rx) = tokio::sync::oneshot::channel();
                drop(placeholder_tx);
                let finish = std::mem::replace(&mut response.finish, placeholder_rx);
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    drop(finish.await);
                    this.decrement_and_notify();
                });
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(
                    credential = %self.credential,
                    worker_name = %self.name,
                    queueing_ms,
                    error = %err,
                    "worker pipe failed"
                );
                self.decrement_and_notify();
                Err(BrokerError::Delegate(err))
            }
        }
    }

    fn decrement_and_notify(self: &Arc<Self>) {
        let previous = self.active_request_count.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.idle_notify.notify_one();
        }
        self.spawn_drain_trigger();
    }

    /// Re-run `tryConsumeQueue` against this worker's broker on its own task,
    /// so every post-request free-transition (not only bind completion) can
    /// drain a pending request that was queued while all workers were busy
    /// (spec §4.3.3, §4.2 `downToZero`).
    fn spawn_drain_trigger(self: &Arc<Self>) {
        let Some(broker) = self.broker_handle() else {
            return;
        };
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            broker.try_consume_queue(&worker).await;
        });
    }

    /// Stop routing new traffic to this worker and wait for any in-flight
    /// requests to drain. Returns immediately if already idle.
    pub async fn close_traffic(&self) {
        self.traffic_off.store(true, Ordering::Release);
        loop {
            if self.active_request_count() == 0 {
                return;
            }
            self.idle_notify.notified().await;
        }
    }
}
