use thiserror::Error;

use super::DelegateError;

/// Failure taxonomy for [`crate::broker::WorkerBroker`] operations.
///
/// `Display` text for `ResourceExhausted` and `DeadlineExceeded` matches the
/// wire-level error taxonomy callers re-encode onto a response.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("RESOURCE_EXHAUSTED: rate limit exceeded for function {function}")]
    ResourceExhausted { function: String },
    #[error("DEADLINE_EXCEEDED: request {request_id} for function {function} timed out in queue")]
    DeadlineExceeded {
        function: String,
        request_id: String,
    },
    #[error("no available worker for function {function} (request queue disabled)")]
    QueueDisabled { function: String },
    #[error("credential {credential} is already registered as pending for function {function}")]
    DuplicateCredential {
        function: String,
        credential: String,
    },
    #[error("credential {credential} is not in the Pending state")]
    WorkerNotPending { credential: String },
    #[error("credential {credential} is not registered")]
    UnknownCredential { credential: String },
    #[error(transparent)]
    Delegate(#[from] DelegateError),
    #[error("fast-failed: {message}")]
    FastFailed { message: String },
}
