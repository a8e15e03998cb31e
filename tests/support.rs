//! Shared fakes for the integration scenarios in this directory. Each fake
//! implements one external-collaborator trait deterministically, so the
//! broker/controller tests need no real worker process, IPC transport, or
//! cross-plane RPC.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use fnbroker::control_plane::{BrokerShrinkRequest, CapacityManager, DataPlaneClientManager, Delta, ReservationController, WorkerLauncher};
use fnbroker::delegate::{Delegate, InvokeRequest, InvokeResponse};
use fnbroker::error::{ControllerError, DelegateError};

/// A delegate that answers every `trigger` immediately with an already
/// drained body — dispatch completes, `activeRequestCount` drops back to
/// zero on the next scheduler tick.
pub struct ImmediateDelegate {
    pub inits: Mutex<Vec<String>>,
}

impl ImmediateDelegate {
    pub fn new() -> Self {
        Self {
            inits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Delegate for ImmediateDelegate {
    async fn init(&self, credential: &str, _deadline_epoch_ms: u64) -> Result<(), DelegateError> {
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        self.inits.lock().unwrap().push(credential.to_owned());
        Ok(())
    }

    async fn trigger(&self, credential: &str, _request: InvokeRequest) -> Result<InvokeResponse, DelegateError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(tx.send(()));
        Ok(InvokeResponse {
            body: vec![],
            status: 200,
            queueing_ms: 0,
            worker_name: credential.to_owned(),
            finish: rx,
        })
    }

    async fn inspector_start(&self, _credential: &str) -> Result<(), DelegateError> {
        Ok(())
    }

    async fn reset_peer(&self, _credential: &str) -> Result<(), DelegateError> {
        Ok(())
    }
}

/// A delegate whose response body never drains, so the worker it serves
/// keeps `activeRequestCount` at one for as long as the delegate itself
/// stays alive — useful for pinning down which worker a shrink pass should
/// prefer to spare. Unlike dropping the sender half of the `finish` channel
/// immediately (which lets the receiver resolve right away), this holds
/// every sender it hands out so `finish` only resolves once the delegate is
/// dropped.
#[derive(Default)]
pub struct StuckDelegate {
    senders: Mutex<Vec<tokio::sync::oneshot::Sender<()>>>,
}

impl StuckDelegate {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Delegate for StuckDelegate {
    async fn init(&self, _credential: &str, _deadline_epoch_ms: u64) -> Result<(), DelegateError> {
        Ok(())
    }

    async fn trigger(&self, credential: &str, _request: InvokeRequest) -> Result<InvokeResponse, DelegateError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        #[expect(clippy::unwrap_used, reason = "mutex is never poisoned: no panics while held")]
        self.senders.lock().unwrap().push(tx);
        Ok(InvokeResponse {
            body: vec![],
            status: 200,
            queueing_ms: 0,
            worker_name: credential.to_owned(),
            finish: rx,
        })
    }

    async fn inspector_start(&self, _credential: &str) -> Result<(), DelegateError> {
        Ok(())
    }

    async fn reset_peer(&self, _credential: &str) -> Result<(), DelegateError> {
        Ok(())
    }
}

/// A delegate whose `init` always fails, for cold-start fast-fail scenarios.
pub struct FailingInitDelegate;

#[async_trait]
impl Delegate for FailingInitDelegate {
    async fn init(&self, _credential: &str, _deadline_epoch_ms: u64) -> Result<(), DelegateError> {
        Err(DelegateError::Message {
            message: "cold start failed".to_owned(),
        })
    }

    async fn trigger(&self, _credential: &str, _request: InvokeRequest) -> Result<InvokeResponse, DelegateError> {
        Err(DelegateError::Message {
            message: "unreachable: init never succeeded".to_owned(),
        })
    }

    async fn inspector_start(&self, _credential: &str) -> Result<(), DelegateError> {
        Ok(())
    }

    async fn reset_peer(&self, _credential: &str) -> Result<(), DelegateError> {
        Ok(())
    }
}

/// A launcher that hands out sequential `cred-N` credentials.
pub struct SequentialLauncher {
    next: AtomicU64,
}

impl SequentialLauncher {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }
}

#[async_trait]
impl WorkerLauncher for SequentialLauncher {
    async fn launch(&self, _function: &str, count: u32) -> Result<Vec<String>, ControllerError> {
        let mut credentials = Vec::new();
        for _ in 0..count {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            credentials.push(format!("cred-{id}"));
        }
        Ok(credentials)
    }
}

/// A data-plane client that confirms every shrink batch it is handed in
/// full and records every worker it is asked to stop.
pub struct RecordingDataPlane {
    pub evicted: tokio::sync::Mutex<Vec<String>>,
    pub batches: tokio::sync::Mutex<Vec<Vec<BrokerShrinkRequest>>>,
}

impl RecordingDataPlane {
    pub fn new() -> Self {
        Self {
            evicted: tokio::sync::Mutex::new(Vec::new()),
            batches: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DataPlaneClientManager for RecordingDataPlane {
    async fn reduce_capacity(&self, requests: Vec<BrokerShrinkRequest>) -> Result<Vec<BrokerShrinkRequest>, ControllerError> {
        self.batches.lock().await.push(requests.clone());
        Ok(requests)
    }

    async fn stop_worker(&self, _function: &str, credential: &str) -> Result<(), ControllerError> {
        self.evicted.lock().await.push(credential.to_owned());
        Ok(())
    }

    async fn start_worker_fast_fail(&self, _function: &str, _message: &str) -> Result<(), ControllerError> {
        Ok(())
    }
}

/// A data-plane client whose `reduce_capacity` only confirms a caller-chosen
/// subset of what it was asked to drain — used to exercise the "data plane
/// drained fewer workers than requested" branch (spec scenario S4).
pub struct PartialDrainDataPlane {
    pub confirm: Vec<String>,
    pub evicted: tokio::sync::Mutex<Vec<String>>,
    pub batches: tokio::sync::Mutex<Vec<Vec<BrokerShrinkRequest>>>,
}

impl PartialDrainDataPlane {
    pub fn new(confirm: Vec<String>) -> Self {
        Self {
            confirm,
            evicted: tokio::sync::Mutex::new(Vec::new()),
            batches: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DataPlaneClientManager for PartialDrainDataPlane {
    async fn reduce_capacity(&self, requests: Vec<BrokerShrinkRequest>) -> Result<Vec<BrokerShrinkRequest>, ControllerError> {
        self.batches.lock().await.push(requests.clone());
        let confirmed = requests
            .into_iter()
            .filter_map(|mut request| {
                request.workers.retain(|worker| self.confirm.contains(&worker.credential));
                if request.workers.is_empty() {
                    None
                } else {
                    Some(request)
                }
            })
            .collect();
        Ok(confirmed)
    }

    async fn stop_worker(&self, _function: &str, credential: &str) -> Result<(), ControllerError> {
        self.evicted.lock().await.push(credential.to_owned());
        Ok(())
    }

    async fn start_worker_fast_fail(&self, _function: &str, _message: &str) -> Result<(), ControllerError> {
        Ok(())
    }
}

/// A capacity manager with a caller-controlled fixed delta table, for tests
/// that want to dictate the exact autoscale outcome rather than derive it
/// from a memory budget.
pub struct FixedCapacityManager {
    pub deltas: HashMap<String, Delta>,
    pub allow_expand: bool,
}

impl FixedCapacityManager {
    pub fn new(allow_expand: bool) -> Self {
        Self {
            deltas: HashMap::new(),
            allow_expand,
        }
    }

    pub fn with_shrink(mut self, function: &str, shrink: u32) -> Self {
        self.deltas.insert(function.to_owned(), Delta { expand: 0, shrink });
        self
    }

    pub fn with_expand(mut self, function: &str, expand: u32) -> Self {
        self.deltas.insert(function.to_owned(), Delta { expand, shrink: 0 });
        self
    }
}

impl CapacityManager for FixedCapacityManager {
    fn allow_expanding_on_request_queueing(&self, _function: &str, _views: &[fnbroker::control_plane::BrokerStats]) -> bool {
        self.allow_expand
    }

    fn evaluate_scale_deltas(&self, _views: &[fnbroker::control_plane::BrokerStats]) -> HashMap<String, Delta> {
        self.deltas.clone()
    }
}

/// A reservation controller that records every `expand` call it receives,
/// for tests asserting the controller routes below-floor expansion there
/// instead of through the regular `WorkerLauncher` path.
#[derive(Default)]
pub struct RecordingReservationController {
    pub calls: tokio::sync::Mutex<Vec<(String, u32)>>,
}

impl RecordingReservationController {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationController for RecordingReservationController {
    async fn expand(&self, function: &str, count: u32) -> Result<(), ControllerError> {
        self.calls.lock().await.push((function.to_owned(), count));
        Ok(())
    }
}
