use thiserror::Error;

use super::{BrokerError, ConfigError, ControllerError, DelegateError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("TOML error: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Delegate error: {0}")]
    Delegate(#[from] DelegateError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn broker<E>(error: E) -> Self
    where
        E: Into<BrokerError>,
    {
        error.into().into()
    }

    pub fn controller<E>(error: E) -> Self
    where
        E: Into<ControllerError>,
    {
        error.into().into()
    }

    pub fn config<E>(error: E) -> Self
    where
        E: Into<ConfigError>,
    {
        error.into().into()
    }

    pub fn delegate<E>(error: E) -> Self
    where
        E: Into<DelegateError>,
    {
        error.into().into()
    }
}
