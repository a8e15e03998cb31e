//! IPC facade to a worker process (spec §6 "Delegate").
//!
//! Out of scope for this crate: wire encoding and the worker runtime itself.
//! Callers supply a concrete [`Delegate`] that talks to the real sandboxed
//! process; this crate only depends on the interface below.
use async_trait::async_trait;

use crate::error::DelegateError;

/// Request payload and routing metadata handed to a worker via `invoke`.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub request_id: String,
    pub input: Vec<u8>,
    pub deadline_epoch_ms: u64,
    pub debugger_tag: Option<String>,
}

/// Response returned by a worker's `invoke`. `finish` resolves once the
/// response body has been fully consumed — see spec §4.2: the worker's
/// `activeRequestCount` is decremented only after `finish` resolves, not
/// when `trigger` itself returns.
#[derive(Debug)]
pub struct InvokeResponse {
    pub body: Vec<u8>,
    pub status: u16,
    /// Queueing wait in ms, set by [`crate::worker::Worker::pipe`] after the
    /// delegate returns; `0` until then.
    pub queueing_ms: u64,
    pub worker_name: String,
    /// Resolves when the response body has been fully drained. A delegate
    /// that buffers the whole body up front (as the fakes under `tests/` do)
    /// can complete this immediately.
    pub finish: tokio::sync::oneshot::Receiver<()>,
}

/// The IPC facade between the data plane and one worker process.
#[async_trait]
pub trait Delegate: Send + Sync {
    /// Initialize the worker runtime bound to `credential`. Deadline is
    /// supplied by the caller (the broker derives it from
    /// `initializationTimeout`).
    async fn init(
        &self,
        credential: &str,
        deadline_epoch_ms: u64,
    ) -> Result<(), DelegateError>;

    /// Forward one invocation to the worker bound to `credential`.
    async fn trigger(
        &self,
        credential: &str,
        request: InvokeRequest,
    ) -> Result<InvokeResponse, DelegateError>;

    /// Attach a debugger to the worker bound to `credential`
    /// (disposable + `debuggerTag` path only).
    async fn inspector_start(&self, credential: &str) -> Result<(), DelegateError>;

    /// Tear down a peer after an `init` failure.
    async fn reset_peer(&self, credential: &str) -> Result<(), DelegateError>;
}
