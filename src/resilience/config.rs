//! # Resilience Runtime Configuration
//!
//! Runtime (duration-typed) configuration for circuit breakers and retry
//! policies. For the YAML-facing records see [`crate::config`], which convert
//! into these via `to_resilience_config()` / `to_retry_config()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before letting a trial call through
    pub timeout: Duration,

    /// Number of consecutive trial successes needed to close the circuit
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    /// Preset for chatty, latency-sensitive REST endpoints
    pub fn for_remote_api() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_remote_api()
    }
}

/// Backoff parameters for a [`RetryPolicy`](crate::resilience::RetryPolicy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` disables retrying
    pub max_retries: u32,

    /// Floor of every computed delay
    pub base_delay: Duration,

    /// Ceiling of every computed delay
    pub max_delay: Duration,

    /// Half-width of the uniform jitter band around 1.0
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        use crate::constants::defaults;

        Self {
            max_retries: defaults::RETRY_MAX_RETRIES,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            jitter_factor: defaults::RETRY_JITTER_FACTOR,
        }
    }
}
