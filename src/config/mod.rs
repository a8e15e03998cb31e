//! Function-profile configuration loading and application.
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use loader::load_profiles;
pub use types::{BrokerConfig, FastFailPolicy, FunctionProfile, RateLimitConfig, ShrinkStrategy};
