use thiserror::Error;

/// Failure taxonomy for [`crate::control_plane::controller::DefaultController`].
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no function profile registered for {name}")]
    NoFunction { name: String },
    #[error("worker launch failed for {function}: {message}")]
    LaunchFailed { function: String, message: String },
    #[error("data-plane RPC failed: {message}")]
    DataPlane { message: String },
    #[error("reservation controller expand failed for {function}: {message}")]
    ReservationExpand { function: String, message: String },
}
