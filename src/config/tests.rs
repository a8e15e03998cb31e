use std::io::Write;

use crate::error::AppResult;

use super::loader::load_profiles;
use super::types::ShrinkStrategy;

#[test]
fn load_profiles_parses_functions_and_defaults() -> AppResult<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"
            default_shrink_strategy = "FIFO"
            virtual_memory_pool_size_mb = 4096

            [[functions]]
            name = "hello"
            max_activate_requests = 5
            disposable = false

            [[functions]]
            name = "echo"
            disposable = true
            shrink_strategy = "FILO"
        "#
    )?;

    let config = load_profiles(file.path())?;
    if config.functions.len() != 2 {
        return Err(crate::error::AppError::config(
            crate::error::ConfigError::InvalidProfile {
                name: "test".to_owned(),
                field: "functions",
                reason: "expected two profiles".to_owned(),
            },
        ));
    }
    if config.default_shrink_strategy() != ShrinkStrategy::Fifo {
        return Err(crate::error::AppError::config(
            crate::error::ConfigError::InvalidProfile {
                name: "test".to_owned(),
                field: "default_shrink_strategy",
                reason: "expected FIFO".to_owned(),
            },
        ));
    }

    let map = config.profile_map();
    let echo = map
        .get("echo")
        .ok_or_else(|| crate::error::AppError::config(crate::error::ConfigError::InvalidProfile {
            name: "echo".to_owned(),
            field: "name",
            reason: "profile missing".to_owned(),
        }))?;
    if echo.max_activate_requests() != 1 {
        return Err(crate::error::AppError::config(
            crate::error::ConfigError::InvalidProfile {
                name: "echo".to_owned(),
                field: "max_activate_requests",
                reason: "disposable functions must cap at 1".to_owned(),
            },
        ));
    }

    Ok(())
}
