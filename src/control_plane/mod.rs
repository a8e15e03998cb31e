//! Control-plane mirror and autoscaling (spec §3 "StateManager / BrokerView",
//! "CapacityManager", "DefaultController").
pub mod capacity;
pub mod controller;
pub mod launcher;
pub mod shrink_strategy;
pub mod state;

pub use capacity::{BudgetedCapacityManager, CapacityManager, Delta};
pub use controller::DefaultController;
pub use launcher::{BrokerShrinkRequest, DataPlaneClientManager, ReservationController, WorkerLauncher, WorkerRef};
pub use state::{BrokerStats, BrokerView, StateManager, WorkerStat};
