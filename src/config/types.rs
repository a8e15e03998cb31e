use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Per-function dispatcher tuning, mirrored from `StateManager`/profile sync
/// in the control plane. See spec §3 "WorkerBroker".
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FunctionProfile {
    pub name: String,
    #[serde(default = "default_max_activate_requests")]
    pub max_activate_requests: u32,
    #[serde(default)]
    pub disposable: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default = "default_true")]
    pub request_queue_enabled: bool,
    #[serde(default = "default_initialization_timeout_ms")]
    pub initialization_timeout_ms: u64,
    #[serde(default)]
    pub fast_fail: FastFailPolicy,
    #[serde(default)]
    pub shrink_strategy: Option<ShrinkStrategy>,
    #[serde(default)]
    pub reservation_count: u32,
}

impl FunctionProfile {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_activate_requests: default_max_activate_requests(),
            disposable: false,
            rate_limit: None,
            request_queue_enabled: true,
            initialization_timeout_ms: default_initialization_timeout_ms(),
            fast_fail: FastFailPolicy::default(),
            shrink_strategy: None,
            reservation_count: 0,
        }
    }

    /// Effective per-worker concurrency limit; disposable brokers always
    /// activate at most one request per worker regardless of the
    /// configured `max_activate_requests` (spec §4.3.6).
    #[must_use]
    pub fn max_activate_requests(&self) -> u32 {
        if self.disposable { 1 } else { self.max_activate_requests }
    }

    #[must_use]
    pub fn initialization_timeout(&self) -> Duration {
        Duration::from_millis(self.initialization_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    pub tokens_per_fill: u64,
    #[serde(default = "default_fill_interval_ms")]
    pub fill_interval_ms: u64,
    pub max_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FastFailPolicy {
    #[serde(default)]
    pub fast_fail_requests_on_starting: bool,
}

/// Victim-selection strategy for autoscale shrink (spec §4.4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShrinkStrategy {
    Fifo,
    Filo,
    Lcc,
}

impl Default for ShrinkStrategy {
    fn default() -> Self {
        Self::Lcc
    }
}

/// Process-wide defaults plus the set of registered function profiles.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub default_shrink_strategy: Option<ShrinkStrategy>,
    #[serde(default)]
    pub virtual_memory_pool_size_mb: Option<u64>,
    #[serde(default)]
    pub functions: Vec<FunctionProfile>,
}

impl BrokerConfig {
    #[must_use]
    pub fn profile_map(&self) -> HashMap<String, FunctionProfile> {
        self.functions
            .iter()
            .map(|profile| (profile.name.clone(), profile.clone()))
            .collect()
    }

    #[must_use]
    pub fn default_shrink_strategy(&self) -> ShrinkStrategy {
        self.default_shrink_strategy.unwrap_or_default()
    }
}

const fn default_max_activate_requests() -> u32 {
    10
}

const fn default_true() -> bool {
    true
}

const fn default_initialization_timeout_ms() -> u64 {
    10_000
}

const fn default_fill_interval_ms() -> u64 {
    1000
}
