use thiserror::Error;

/// Failure taxonomy for loading and applying [`crate::config`] profiles.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("function profile {name} has invalid {field}: {reason}")]
    InvalidProfile {
        name: String,
        field: &'static str,
        reason: String,
    },
}
