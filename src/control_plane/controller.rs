//! Default autoscaling controller (spec §4.4 "DefaultController").
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::broker::{BrokerEvent, WorkerBroker};
use crate::error::ControllerError;

use super::capacity::CapacityManager;
use super::launcher::{BrokerShrinkRequest, DataPlaneClientManager, ReservationController, WorkerLauncher, WorkerRef};
use super::shrink_strategy::select_victims;
use super::state::StateManager;

/// Reacts to `RequestQueueing` events (expand) and periodic autoscale
/// passes over the aggregated [`StateManager`] view (expand + shrink),
/// delegating the actual provisioning/eviction work to external
/// collaborators.
///
/// `shrinking` is a bare `AtomicBool` test-and-set guard, not a mutex
/// (spec §5): an autoscale tick that finds a shrink pass already in flight
/// simply skips rather than queuing up behind it.
pub struct DefaultController {
    state: Arc<StateManager>,
    capacity: Arc<dyn CapacityManager>,
    launcher: Arc<dyn WorkerLauncher>,
    data_plane: Arc<dyn DataPlaneClientManager>,
    reservation: Option<Arc<dyn ReservationController>>,
    brokers: Mutex<HashMap<String, Arc<WorkerBroker>>>,
    shrinking: AtomicBool,
}

impl DefaultController {
    #[must_use]
    pub fn new(
        state: Arc<StateManager>,
        capacity: Arc<dyn CapacityManager>,
        launcher: Arc<dyn WorkerLauncher>,
        data_plane: Arc<dyn DataPlaneClientManager>,
        reservation: Option<Arc<dyn ReservationController>>,
    ) -> Self {
        Self {
            state,
            capacity,
            launcher,
            data_plane,
            reservation,
            brokers: Mutex::new(HashMap::new()),
            shrinking: AtomicBool::new(false),
        }
    }

    /// Register a broker the controller is responsible for expanding and
    /// shrinking. Also subscribes to its event stream and spawns a task that
    /// forwards `RequestQueueing` events into [`Self::expand`].
    pub async fn watch_broker(self: &Arc<Self>, broker: Arc<WorkerBroker>) {
        let mut receiver = broker.subscribe();
        {
            let mut brokers = self.brokers.lock().await;
            brokers.insert(broker.name.clone(), Arc::clone(&broker));
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                if let BrokerEvent::RequestQueueing { function, .. } = event {
                    if let Err(err) = controller.expand(&function).await {
                        tracing::warn!("autoscale expand failed for {function}: {err}");
                    }
                }
            }
        });
    }

    /// Launch one more worker for `function`, bounded by the capacity
    /// manager's budget, and register it with the broker as a pending
    /// credential (spec §4.4.1).
    ///
    /// On launch failure, notifies the data plane via `start_worker_fast_fail`
    /// and immediately fast-fails the broker's own pending queue, mirroring
    /// the `{fatal:true}` path a real launcher failure takes (spec §4.4.1,
    /// §7).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NoFunction`] if no broker is registered for
    /// `function`, and [`ControllerError::LaunchFailed`] if the launcher or
    /// the broker's `register_credential` call fails.
    pub async fn expand(&self, function: &str) -> Result<(), ControllerError> {
        let views = self.state.snapshot();
        if !self.capacity.allow_expanding_on_request_queueing(function, &views) {
            return Ok(());
        }

        if let Err(err) = self.launch_and_register(function, 1).await {
            self.notify_launch_failure(function, &err).await;
            return Err(err);
        }

        if let Some(reservation) = &self.reservation {
            if let Some(view) = self.state.get(function) {
                if view.reservation_count > 0 {
                    reservation.expand(function, view.reservation_count).await?;
                }
            }
        }

        Ok(())
    }

    async fn launch_and_register(&self, function: &str, count: u32) -> Result<(), ControllerError> {
        let broker = {
            let brokers = self.brokers.lock().await;
            brokers.get(function).cloned()
        };
        let Some(broker) = broker else {
            return Err(ControllerError::NoFunction { name: function.to_owned() });
        };

        let credentials = self.launcher.launch(function, count).await?;
        for credential in credentials {
            broker
                .register_credential(&credential, &credential)
                .await
                .map_err(|err| ControllerError::LaunchFailed {
                    function: function.to_owned(),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }

    async fn notify_launch_failure(&self, function: &str, err: &ControllerError) {
        let message = err.to_string();
        if let Err(notify_err) = self.data_plane.start_worker_fast_fail(function, &message).await {
            tracing::warn!("start_worker_fast_fail notification failed for {function}: {notify_err}");
        }
        let broker = {
            let brokers = self.brokers.lock().await;
            brokers.get(function).cloned()
        };
        if let Some(broker) = broker {
            broker.fast_fail_all_pendings_due_to_start_error(true, &message).await;
        }
    }

    /// Run one autoscale pass: compute deltas from the aggregated view,
    /// partition expansion into reservation-floor and regular requests, and
    /// run shrink concurrently with both expand phases (spec §4.4.2). A
    /// no-op if a shrink pass is already running.
    ///
    /// # Errors
    ///
    /// Returns the first [`ControllerError`] any phase raises, in the
    /// priority order shrink, regular expand, reservation expand; the other
    /// phases still run to completion before the error surfaces (spec
    /// §4.4.2: "any error from either phase is captured; the first is
    /// re-thrown after both phases complete").
    pub async fn autoscale(&self) -> Result<(), ControllerError> {
        if self
            .shrinking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let result = self.autoscale_inner().await;
        self.shrinking.store(false, Ordering::Release);
        result
    }

    async fn autoscale_inner(&self) -> Result<(), ControllerError> {
        let views = self.state.snapshot();
        let deltas = self.capacity.evaluate_scale_deltas(&views);
        let views_by_function: HashMap<&str, &super::state::BrokerStats> =
            views.iter().map(|view| (view.function.as_str(), view)).collect();

        let mut shrink_targets = Vec::new();
        let mut regular_expand = Vec::new();
        let mut reservation_expand = Vec::new();

        for (function, delta) in &deltas {
            if delta.shrink > 0 {
                shrink_targets.push((function.clone(), delta.shrink));
            }
            if delta.expand > 0 {
                let below_reservation = views_by_function
                    .get(function.as_str())
                    .is_some_and(|view| u32::try_from(view.worker_count).unwrap_or(u32::MAX) < view.reservation_count);
                if below_reservation {
                    reservation_expand.push((function.clone(), delta.expand));
                } else {
                    regular_expand.push((function.clone(), delta.expand));
                }
            }
        }

        let (shrink_result, regular_result, reservation_result) = tokio::join!(
            self.shrink_many(&shrink_targets),
            self.expand_many(&regular_expand),
            self.reservation_expand_many(&reservation_expand),
        );

        shrink_result.or(regular_result).or(reservation_result)
    }

    async fn expand_many(&self, targets: &[(String, u32)]) -> Result<(), ControllerError> {
        for (function, count) in targets {
            if let Err(err) = self.launch_and_register(function, *count).await {
                self.notify_launch_failure(function, &err).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn reservation_expand_many(&self, targets: &[(String, u32)]) -> Result<(), ControllerError> {
        let Some(reservation) = &self.reservation else {
            return Ok(());
        };
        for (function, count) in targets {
            reservation.expand(function, *count).await?;
        }
        Ok(())
    }

    /// Evict and remove workers across every function named in `targets`,
    /// picked by each function's shrink strategy, batched into a single
    /// `reduce_capacity` call (spec §4.4.3). Inspector and disposable
    /// brokers are never shrink candidates. `stop_worker` calls for workers
    /// the data plane confirms draining run in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first [`ControllerError::DataPlane`] any RPC in this pass
    /// raises; other stop calls in the same pass still run to completion.
    async fn shrink_many(&self, targets: &[(String, u32)]) -> Result<(), ControllerError> {
        if targets.is_empty() {
            return Ok(());
        }

        let mut requests = Vec::new();
        let mut brokers_by_function = HashMap::new();

        for (function, count) in targets {
            let broker = {
                let brokers = self.brokers.lock().await;
                brokers.get(function).cloned()
            };
            let Some(broker) = broker else {
                tracing::warn!("autoscale shrink skipped for unregistered function {function}");
                continue;
            };
            if broker.disposable() {
                continue;
            }

            let view = self.state.get(function);
            if view.as_ref().is_some_and(|view| view.is_inspector) {
                continue;
            }
            let strategy_override = view.as_ref().and_then(|view| view.shrink_strategy_override.clone());

            let workers = broker.bound_workers().await;
            let victim_credentials = select_victims(strategy_override.as_deref(), &workers, *count);
            let worker_refs: Vec<WorkerRef> = workers
                .iter()
                .filter(|(credential, _)| victim_credentials.contains(credential))
                .map(|(credential, worker)| WorkerRef {
                    name: worker.name.clone(),
                    credential: credential.clone(),
                })
                .collect();
            if worker_refs.is_empty() {
                continue;
            }

            requests.push(BrokerShrinkRequest {
                function_name: function.clone(),
                inspector: false,
                workers: worker_refs,
            });
            brokers_by_function.insert(function.clone(), broker);
        }

        if requests.is_empty() {
            return Ok(());
        }

        let confirmed = self.data_plane.reduce_capacity(requests).await?;

        let mut stop_tasks = Vec::new();
        for request in confirmed {
            let Some(broker) = brokers_by_function.get(&request.function_name).cloned() else {
                continue;
            };
            for worker_ref in request.workers {
                broker.mark_draining(&worker_ref.credential).await;
                let Some(worker) = broker.remove_worker(&worker_ref.credential).await else {
                    continue;
                };
                let data_plane = Arc::clone(&self.data_plane);
                let function_name = request.function_name.clone();
                let broker_for_drain = Arc::clone(&broker);
                stop_tasks.push(tokio::spawn(async move {
                    broker_for_drain.close_worker_traffic(&worker_ref.credential, &worker).await;
                    data_plane.stop_worker(&function_name, &worker_ref.credential).await
                }));
            }
        }

        let mut first_err = None;
        for task in stop_tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(join_err) => tracing::warn!("stop_worker task panicked: {join_err}"),
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
