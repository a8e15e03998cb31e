use thiserror::Error;

/// Opaque failure surfaced by an external [`crate::delegate::Delegate`]
/// implementation. The delegate is out of scope for this crate (it is the
/// IPC facade to a worker process); we only need to carry its failure
/// through unchanged, annotated with `queueing`/`worker_name` at the call
/// site (see [`crate::worker::Worker::pipe`]).
#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("delegate call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("{message}")]
    Message { message: String },
}
