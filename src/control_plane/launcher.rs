//! External collaborators the controller calls out to, expressed as traits
//! so callers supply real implementations (spec §6, §1 "Out of scope").
use async_trait::async_trait;

use crate::error::ControllerError;

/// Spawns new worker processes (containers) for a function. Out of scope:
/// sandboxing and process supervision themselves.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Launch `count` new workers for `function`, returning the credential
    /// assigned to each.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::LaunchFailed`] if the launcher cannot
    /// provision the requested workers.
    async fn launch(&self, function: &str, count: u32) -> Result<Vec<String>, ControllerError>;
}

/// One worker named in a [`BrokerShrinkRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRef {
    pub name: String,
    pub credential: String,
}

/// One broker's worth of shrink victims, batched into a single
/// `reduceCapacity` call across every function shrinking in the same
/// autoscale pass (spec §4.4.3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerShrinkRequest {
    pub function_name: String,
    pub inspector: bool,
    pub workers: Vec<WorkerRef>,
}

/// Cross-plane RPC facade used to vacate workers ahead of removing them from
/// their brokers' indices.
#[async_trait]
pub trait DataPlaneClientManager: Send + Sync {
    /// Ask the data plane to stop routing traffic to every worker named
    /// across `requests` — one call batching every broker's victims for this
    /// autoscale pass, not one call per worker (spec §4.4.3). Returns the
    /// subset the data plane actually drained; the controller only proceeds
    /// to `stop_worker` for workers present in the response.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::DataPlane`] if the RPC fails.
    async fn reduce_capacity(&self, requests: Vec<BrokerShrinkRequest>) -> Result<Vec<BrokerShrinkRequest>, ControllerError>;

    /// Stop the worker process bound to `credential` after the data plane
    /// has confirmed it drained. Calls for distinct workers in the same pass
    /// run concurrently (spec §4.4.3: "all stop calls run in parallel").
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::DataPlane`] if the RPC fails.
    async fn stop_worker(&self, function: &str, credential: &str) -> Result<(), ControllerError>;

    /// Notify the data plane that a launch triggered by `RequestQueueing`
    /// failed, so it can fast-fail whatever requests were waiting on that
    /// worker (spec §4.4.1, §6 `startWorkerFastFail`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::DataPlane`] if the notification RPC fails.
    async fn start_worker_fast_fail(&self, function: &str, message: &str) -> Result<(), ControllerError>;
}

/// Capacity-floor policy owner. Out of scope beyond this interface (spec §1
/// Non-goals): this crate never decides reservation counts itself, it only
/// notifies the reservation controller so a reserved floor of warm workers
/// can be topped up independently of queue-pressure-driven expansion.
#[async_trait]
pub trait ReservationController: Send + Sync {
    /// Ensure at least `count` reserved (warm, idle) workers exist for
    /// `function`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::ReservationExpand`] if the reservation
    /// controller cannot satisfy the floor.
    async fn expand(&self, function: &str, count: u32) -> Result<(), ControllerError>;
}
