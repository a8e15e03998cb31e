//! Core library for `fnbroker`.
//!
//! This crate provides the per-function request dispatcher (broker) and the
//! default autoscaling controller for a function-as-a-service data plane.
//! Worker-process spawning, IPC transport, and cross-plane RPC are external
//! collaborators expressed as traits ([`delegate::Delegate`],
//! [`control_plane::launcher::WorkerLauncher`],
//! [`control_plane::launcher::DataPlaneClientManager`]); callers supply real
//! implementations.
pub mod config;
pub mod control_plane;
pub mod delegate;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod pending_request;
pub mod token_bucket;
pub mod worker;
pub mod broker;

pub use broker::{BrokerEvent, ContainerEvent, WorkerBroker};
pub use error::{AppError, AppResult};
pub use worker::Worker;
