use std::path::Path;

use crate::error::{ConfigError, AppResult};

use super::types::BrokerConfig;

/// Load a [`BrokerConfig`] from a TOML file on disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse as a valid
/// `BrokerConfig`.
pub fn load_profiles(path: &Path) -> AppResult<BrokerConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        ConfigError::Read {
            path: path.display().to_string(),
            source,
        }
    })?;
    let config: BrokerConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(config)
}
