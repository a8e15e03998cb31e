mod app;
mod broker;
mod config;
mod controller;
mod delegate;

pub use app::{AppError, AppResult};
pub use broker::BrokerError;
pub use config::ConfigError;
pub use controller::ControllerError;
pub use delegate::DelegateError;
