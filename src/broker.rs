//! Per-function request dispatcher (spec §3/§4.3 "WorkerBroker").
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, Mutex};

use crate::config::FunctionProfile;
use crate::delegate::Delegate;
use crate::error::BrokerError;
use crate::metrics::Metrics;
use crate::pending_request::{PendingOutcome, PendingRequest};
use crate::token_bucket::TokenBucket;
use crate::worker::Worker;

/// Worker credential lifecycle state (spec §3 "worker index").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Pending,
    Bound,
    Draining,
    Stopped,
}

/// One entry of the broker's credential → worker index.
#[derive(Debug, Clone)]
pub struct WorkerItem {
    pub status: WorkerStatus,
    pub name: String,
    pub worker: Option<Arc<Worker>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueStatus {
    PassThrough,
    Queueing,
}

/// Reported transition of a worker's traffic-readiness (spec §6 `BrokerView`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEvent {
    ContainerInstalled,
    RequestDrained,
}

/// Events a [`WorkerBroker`] broadcasts to subscribers (the autoscale
/// controller, primarily) so they never need to poll broker state.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    RequestQueueing {
        function: String,
        is_inspect: bool,
        request_id: String,
    },
    ContainerStatusReport {
        function: String,
        is_inspector: bool,
        name: String,
        event: ContainerEvent,
    },
}

#[derive(Debug, Default)]
struct BrokerState {
    workers: HashMap<String, WorkerItem>,
    queue: VecDeque<Arc<PendingRequest>>,
    queue_status_queueing: bool,
}

impl BrokerState {
    fn queue_status(&self) -> QueueStatus {
        if self.queue_status_queueing {
            QueueStatus::Queueing
        } else {
            QueueStatus::PassThrough
        }
    }
}

/// Dispatches invocations for a single function across its bound workers,
/// applying rate limiting, least-loaded worker selection, and a bounded
/// pending-request queue with per-request deadlines (spec §3/§4.3).
///
/// Broker state (the worker index, the pending-request queue, and the
/// `PassThrough`/`Queueing` flag) lives behind one `tokio::sync::Mutex` —
/// held only for the synchronous bookkeeping around a dispatch, never across
/// an `.await` on a delegate call (spec §5).
#[derive(Debug)]
pub struct WorkerBroker {
    pub name: String,
    profile: FunctionProfile,
    metrics: Arc<Metrics>,
    delegate: Arc<dyn Delegate>,
    token_bucket: Option<TokenBucket>,
    state: Mutex<BrokerState>,
    event_tx: broadcast::Sender<BrokerEvent>,
}

impl WorkerBroker {
    /// `delegate` is owned by the broker (rather than threaded through each
    /// call) so a worker's post-request free-transition can re-invoke
    /// `try_consume_queue` on its own task without a caller-supplied
    /// delegate in scope (spec §4.3.3).
    #[must_use]
    pub fn new(profile: FunctionProfile, metrics: Arc<Metrics>, delegate: Arc<dyn Delegate>) -> Self {
        let token_bucket = profile.rate_limit.map(|cfg| {
            TokenBucket::new(
                cfg.tokens_per_fill,
                Duration::from_millis(cfg.fill_interval_ms),
                cfg.max_tokens,
            )
        });
        let (event_tx, _) = broadcast::channel(256);
        Self {
            name: profile.name.clone(),
            profile,
            metrics,
            delegate,
            token_bucket,
            state: Mutex::new(BrokerState::default()),
            event_tx,
        }
    }

    /// Start the rate limiter's background refill, if one is configured.
    pub fn start(&self) {
        if let Some(bucket) = &self.token_bucket {
            bucket.start();
        }
    }

    /// Subscribe to this broker's lifecycle events (`RequestQueueing`,
    /// `ContainerStatusReport`).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn max_activate_requests(&self) -> u32 {
        self.profile.max_activate_requests()
    }

    /// Whether this function's workers are disposable (spec §4.4.3: shrink
    /// never picks victims from a disposable broker — a disposable worker
    /// already drains itself after one request).
    #[must_use]
    pub fn disposable(&self) -> bool {
        self.profile.disposable
    }

    /// Current queue depth, for the control plane's `BrokerStats` snapshot.
    pub async fn queue_depth(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Bound worker count, for the control plane's `BrokerStats` snapshot.
    pub async fn worker_count(&self) -> usize {
        self.state
            .lock()
            .await
            .workers
            .values()
            .filter(|item| item.status == WorkerStatus::Bound)
            .count()
    }

    fn broadcast(&self, event: BrokerEvent) {
        drop(self.event_tx.send(event));
    }

    /// Reserve a credential slot ahead of `bind_worker` (spec §4.3.5
    /// `registerCredential`).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DuplicateCredential`] if `credential` is
    /// already registered.
    pub async fn register_credential(&self, name: &str, credential: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if state.workers.contains_key(credential) {
            return Err(BrokerError::DuplicateCredential {
                function: self.name.clone(),
                credential: credential.to_owned(),
            });
        }
        state.workers.insert(
            credential.to_owned(),
            WorkerItem {
                status: WorkerStatus::Pending,
                name: name.to_owned(),
                worker: None,
            },
        );
        Ok(())
    }

    /// Initialize the worker process bound to `credential` via `delegate`,
    /// transition it to `Bound`, and immediately try to drain the pending
    /// queue onto it (spec §4.3.5 `bindWorker`).
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::WorkerNotPending`]/[`BrokerError::UnknownCredential`]
    /// if `credential` was never registered or already bound, and
    /// [`BrokerError::Delegate`] if the delegate's `init` call fails (the peer
    /// is reset via `reset_peer` before the error is returned).
    pub async fn bind_worker(self: &Arc<Self>, credential: &str) -> Result<(), BrokerError> {
        let name = {
            let state = self.state.lock().await;
            match state.workers.get(credential) {
                Some(item) if item.status == WorkerStatus::Pending => item.name.clone(),
                Some(_) => {
                    return Err(BrokerError::WorkerNotPending {
                        credential: credential.to_owned(),
                    })
                }
                None => {
                    return Err(BrokerError::UnknownCredential {
                        credential: credential.to_owned(),
                    })
                }
            }
        };

        let deadline_epoch_ms = now_epoch_ms().saturating_add(self.profile.initialization_timeout().as_millis() as u64);

        if let Err(err) = self.delegate.init(credential, deadline_epoch_ms).await {
            drop(self.delegate.reset_peer(credential).await);
            return Err(BrokerError::Delegate(err));
        }

        let worker = Arc::new(Worker::new(name, credential.to_owned(), self.profile.disposable));
        worker.set_broker(Arc::downgrade(self));
        {
            let mut state = self.state.lock().await;
            if let Some(item) = state.workers.get_mut(credential) {
                item.status = WorkerStatus::Bound;
                item.worker = Some(Arc::clone(&worker));
            }
        }

        self.broadcast(BrokerEvent::ContainerStatusReport {
            function: self.name.clone(),
            is_inspector: false,
            name: credential.to_owned(),
            event: ContainerEvent::ContainerInstalled,
        });

        self.try_consume_queue(&worker).await;
        Ok(())
    }

    /// Drop a credential from the worker index unconditionally. Does not
    /// wait for any in-flight `pipe` call on that worker to finish — the
    /// call itself still holds its own `Arc<Worker>` (spec §9 open question:
    /// `removeWorker` does not await draining).
    pub async fn remove_worker(&self, credential: &str) -> Option<Arc<Worker>> {
        let mut state = self.state.lock().await;
        state.workers.remove(credential).and_then(|item| item.worker)
    }

    /// Mark a worker `Draining` (still present in the index, no longer
    /// eligible for dispatch) ahead of a `remove_worker` once it idles.
    pub async fn mark_draining(&self, credential: &str) {
        let mut state = self.state.lock().await;
        if let Some(item) = state.workers.get_mut(credential) {
            item.status = WorkerStatus::Draining;
        }
    }

    /// Snapshot of bound, non-`trafficOff` workers ordered for shrink
    /// victim-selection strategies (spec §4.4.4); each tuple is
    /// `(credential, worker)`.
    pub async fn bound_workers(&self) -> Vec<(String, Arc<Worker>)> {
        let state = self.state.lock().await;
        let mut workers: Vec<(String, Arc<Worker>)> = state
            .workers
            .iter()
            .filter(|(_, item)| item.status == WorkerStatus::Bound)
            .filter_map(|(credential, item)| item.worker.clone().map(|worker| (credential.clone(), worker)))
            .collect();
        workers.sort_by(|left, right| left.0.cmp(&right.0));
        workers
    }

    /// Dispatch or queue one invocation (spec §4.3.1–4.3.3 `invoke`).
    ///
    /// Admission order: rate limit, then an available worker (pass-through),
    /// then the bounded pending queue (if enabled), else
    /// [`BrokerError::QueueDisabled`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ResourceExhausted`] if the function's rate
    /// limiter has no tokens left, [`BrokerError::QueueDisabled`] if no
    /// worker is free and queueing is disabled for this function,
    /// [`BrokerError::DeadlineExceeded`] if a queued request's deadline
    /// elapses before a worker frees up, and whatever [`BrokerError::Delegate`]
    /// the dispatched worker's `pipe` call surfaces.
    pub async fn invoke(
        self: &Arc<Self>,
        request_id: String,
        input: Vec<u8>,
        deadline_epoch_ms: u64,
        debugger_tag: Option<String>,
    ) -> PendingOutcome {
        if let Some(bucket) = &self.token_bucket {
            if !bucket.acquire() {
                return Err(BrokerError::ResourceExhausted {
                    function: self.name.clone(),
                });
            }
        }

        let (pending, rx) = PendingRequest::new(request_id.clone(), input, deadline_epoch_ms, debugger_tag);
        let pending = Arc::new(pending);
        let max_activate = self.max_activate_requests();

        let mut state = self.state.lock().await;
        let already_queueing = state.queue_status() == QueueStatus::Queueing;
        let worker = if already_queueing {
            None
        } else {
            Self::select_worker(&state, max_activate)
        };

        let Some(worker) = worker else {
            if !already_queueing && !self.profile.request_queue_enabled {
                drop(state);
                self.broadcast(BrokerEvent::RequestQueueing {
                    function: self.name.clone(),
                    is_inspect: false,
                    request_id,
                });
                return Err(BrokerError::QueueDisabled {
                    function: self.name.clone(),
                });
            }

            state.queue.push_back(Arc::clone(&pending));
            state.queue_status_queueing = true;
            drop(state);

            self.metrics.record_enqueue(&self.name);
            self.broadcast(BrokerEvent::RequestQueueing {
                function: self.name.clone(),
                is_inspect: false,
                request_id,
            });
            self.arm_deadline_timer(Arc::clone(&pending));

            return rx.await.unwrap_or_else(|_| {
                Err(BrokerError::FastFailed {
                    message: "broker dropped the pending request before it completed".to_owned(),
                })
            });
        };
        drop(state);

        let result = worker.pipe(self.delegate.as_ref(), &pending).await;
        if self.profile.disposable {
            let broker = Arc::clone(self);
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
                let credential = worker.credential.clone();
                broker.close_worker_traffic(&credential, &worker).await;
            });
        }
        result
    }

    /// Least-loaded eligible worker: `trafficOff` workers are treated as
    /// infinitely loaded; ties break on credential (deterministic, not
    /// meaningful) (spec §3 `getAvailableWorker`).
    fn select_worker(state: &BrokerState, max_activate_requests: u32) -> Option<Arc<Worker>> {
        let mut credentials: Vec<&String> = state.workers.keys().collect();
        credentials.sort();

        let mut best: Option<&Arc<Worker>> = None;
        for credential in credentials {
            let Some(item) = state.workers.get(credential) else {
                continue;
            };
            if item.status != WorkerStatus::Bound {
                continue;
            }
            let Some(worker) = &item.worker else {
                continue;
            };
            if worker.traffic_off() {
                continue;
            }
            best = match best {
                None => Some(worker),
                Some(current) if worker.active_request_count() < current.active_request_count() => Some(worker),
                Some(current) => Some(current),
            };
        }

        best.filter(|worker| worker.active_request_count() < max_activate_requests).cloned()
    }

    /// Drain the pending queue onto `worker` while it remains free. Used
    /// both right after a `bindWorker` and after a worker's
    /// `activeRequestCount` returns to a level below its limit.
    ///
    /// A disposable worker makes at most one dispatch *attempt* — a single
    /// `pop_front` — before draining, even if that popped entry turned out
    /// to be already timed out/unavailable and was skipped rather than
    /// piped (spec §9 open question resolution: "attempt" means "the queue
    /// head was observed", not "a pipe call happened"). A non-disposable
    /// worker keeps skipping stale entries until it finds a live one or the
    /// queue empties.
    pub async fn try_consume_queue(self: &Arc<Self>, worker: &Arc<Worker>) {
        loop {
            let max_activate = self.max_activate_requests();
            let (dispatch, attempted) = {
                let mut state = self.state.lock().await;
                if !worker.is_worker_free(max_activate) {
                    return;
                }

                let mut popped = None;
                let mut attempted = false;
                if self.profile.disposable {
                    if let Some(entry) = state.queue.pop_front() {
                        attempted = true;
                        if entry.is_available() {
                            popped = Some(entry);
                        }
                    }
                } else {
                    while let Some(entry) = state.queue.pop_front() {
                        if entry.is_available() {
                            popped = Some(entry);
                            break;
                        }
                    }
                }

                if state.queue.is_empty() {
                    state.queue_status_queueing = false;
                }
                (popped, attempted)
            };

            let dispatched = dispatch.is_some();
            if let Some(entry) = dispatch {
                let result = worker.pipe(self.delegate.as_ref(), &entry).await;
                let wait_ms = entry.wait_ms();
                if entry.try_complete(result) {
                    self.metrics.record_wait(&self.name, wait_ms);
                }
            }

            if self.profile.disposable {
                if attempted {
                    self.close_worker_traffic(&worker.credential, worker).await;
                }
                return;
            }

            if !dispatched {
                return;
            }
        }
    }

    /// Close traffic to `worker` and report the drain to subscribers (spec
    /// §6 `BrokerView`/`ContainerStatusReport` with event `RequestDrained`).
    pub async fn close_worker_traffic(&self, credential: &str, worker: &Worker) {
        worker.close_traffic().await;
        self.broadcast(BrokerEvent::ContainerStatusReport {
            function: self.name.clone(),
            is_inspector: false,
            name: credential.to_owned(),
            event: ContainerEvent::RequestDrained,
        });
    }

    /// Reject every currently-queued request, used when a worker fails to
    /// start (spec §4.3.4 `fastFailAllPendingsDueToStartError`). Runs
    /// unconditionally on a fatal error; otherwise only if the function's
    /// `fastFail.fastFailRequestsOnStarting` policy opts in.
    pub async fn fast_fail_all_pendings_due_to_start_error(&self, fatal: bool, message: &str) {
        if !fatal && !self.profile.fast_fail.fast_fail_requests_on_starting {
            return;
        }

        let drained: Vec<Arc<PendingRequest>> = {
            let mut state = self.state.lock().await;
            let drained = state.queue.drain(..).collect();
            state.queue_status_queueing = false;
            drained
        };

        for entry in drained {
            let wait_ms = entry.wait_ms();
            if entry.try_complete(Err(BrokerError::FastFailed {
                message: message.to_owned(),
            })) {
                self.metrics.record_wait(&self.name, wait_ms);
            }
        }
    }

    fn arm_deadline_timer(self: &Arc<Self>, pending: Arc<PendingRequest>) {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            sleep_until_epoch_ms(pending.deadline_epoch_ms).await;

            if !pending.try_complete(Err(BrokerError::DeadlineExceeded {
                function: broker.name.clone(),
                request_id: pending.request_id.clone(),
            })) {
                return;
            }

            broker.metrics.record_wait(&broker.name, pending.wait_ms());
            let mut state = broker.state.lock().await;
            state.queue.retain(|entry| !Arc::ptr_eq(entry, &pending));
            if state.queue.is_empty() {
                state.queue_status_queueing = false;
            }
        });
    }
}

fn now_epoch_ms() -> u64 {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
}

async fn sleep_until_epoch_ms(deadline_epoch_ms: u64) {
    let now = now_epoch_ms();
    if deadline_epoch_ms > now {
        tokio::time::sleep(Duration::from_millis(deadline_epoch_ms.saturating_sub(now))).await;
    }
}
