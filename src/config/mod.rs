//! # Strata Configuration System
//!
//! Plain configuration records for every component of the data layer. Each
//! component takes its section by value at construction; nothing here reads
//! the process environment except the optional [`ConfigLoader`], which
//! resolves environment-specific YAML overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strata_core::config::ConfigLoader;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = ConfigLoader::load_from_directory_with_env(Path::new("config"), "production")?;
//! let config = loader.config();
//!
//! let retry = config.backoff.to_retry_config();
//! let breaker_defaults = config.circuit_breakers.default_config.to_resilience_config();
//! # let _ = (retry, breaker_defaults);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration structure mirroring strata-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Cache tier settings
    pub cache: CacheConfig,

    /// Circuit breaker configuration for remote endpoints
    pub circuit_breakers: CircuitBreakerConfig,

    /// Backoff and retry configuration
    pub backoff: BackoffConfig,

    /// Offline mutation replay settings
    pub sync: SyncConfig,

    /// Pagination defaults
    pub pagination: PaginationConfig,
}

impl StrataConfig {
    /// Short TTLs and timeouts for fast test feedback
    pub fn for_test() -> Self {
        Self {
            cache: CacheConfig {
                default_ttl_seconds: Some(1),
                max_size: Some(100),
                cleanup_interval_seconds: 1,
            },
            circuit_breakers: CircuitBreakerConfig {
                default_config: CircuitBreakerComponentConfig {
                    failure_threshold: 2,
                    timeout_seconds: 1,
                    success_threshold: 1,
                },
                ..CircuitBreakerConfig::default()
            },
            backoff: BackoffConfig {
                max_retries: 2,
                base_delay_ms: 10,
                max_delay_ms: 100,
                jitter_factor: 0.0,
            },
            sync: SyncConfig::default(),
            pagination: PaginationConfig { page_size: 10 },
        }
    }

    pub fn for_development() -> Self {
        Self {
            cache: CacheConfig {
                default_ttl_seconds: Some(60),
                max_size: Some(500),
                cleanup_interval_seconds: 30,
            },
            ..Self::default()
        }
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.circuit_breakers.validate()?;
        self.backoff.validate()?;
        self.pagination.validate()?;
        Ok(())
    }
}

/// Cache tier configuration.
///
/// `max_size: None` selects the unbounded store with a periodic sweep;
/// `Some(n)` selects the LRU store holding at most `n` entries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied by the repository when writing entries (`None` = never expire)
    pub default_ttl_seconds: Option<u64>,
    pub max_size: Option<usize>,
    /// Interval of the expiry sweep run by the unbounded store
    pub cleanup_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: Some(defaults::CACHE_TTL_SECONDS),
            max_size: Some(defaults::CACHE_MAX_SIZE),
            cleanup_interval_seconds: defaults::CACHE_CLEANUP_INTERVAL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_seconds.map(Duration::from_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn is_bounded(&self) -> bool {
        self.max_size.is_some()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "cache.max_size",
                "must be greater than 0 (omit it for an unbounded cache)",
            ));
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.cleanup_interval_seconds",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker configuration from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Whether remote calls are routed through circuit breakers at all
    pub enabled: bool,

    pub global_settings: CircuitBreakerGlobalSettings,

    /// Configuration for endpoints without a specific entry
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations keyed by endpoint name
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_settings: CircuitBreakerGlobalSettings::default(),
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

/// Global circuit breaker settings from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerGlobalSettings {
    /// Soft limit on registered breakers; exceeding it logs a warning
    pub max_circuit_breakers: usize,
}

impl CircuitBreakerGlobalSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_circuit_breakers == 0 || self.max_circuit_breakers > 1000 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.global_settings.max_circuit_breakers",
                "must be between 1 and 1000",
            ));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerGlobalSettings {
    fn default() -> Self {
        Self {
            max_circuit_breakers: defaults::MAX_CIRCUIT_BREAKERS,
        }
    }
}

/// Per-endpoint circuit breaker configuration from YAML
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Seconds to stay open before letting a trial call through
    pub timeout_seconds: u64,

    /// Consecutive trial successes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::CIRCUIT_FAILURE_THRESHOLD,
            timeout_seconds: defaults::CIRCUIT_TIMEOUT_SECONDS,
            success_threshold: defaults::CIRCUIT_SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    /// Get configuration for a specific endpoint
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.global_settings.validate()?;
        self.default_config
            .validate("circuit_breakers.default_config")?;
        for (name, component) in &self.component_configs {
            component.validate(&format!("circuit_breakers.component_configs.{name}"))?;
        }
        Ok(())
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::config::CircuitBreakerConfig {
        crate::resilience::config::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_seconds),
            success_threshold: self.success_threshold,
        }
    }

    fn validate(&self, path: &str) -> ConfigResult<()> {
        let invalid = |field: &str, reason: &str| {
            ConfigurationError::invalid_value(format!("{path}.{field}"), reason)
        };

        if !(1..=100).contains(&self.failure_threshold) {
            return Err(invalid("failure_threshold", "must be between 1 and 100"));
        }
        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(invalid("timeout_seconds", "must be between 1 and 300"));
        }
        if !(1..=50).contains(&self.success_threshold) {
            return Err(invalid("success_threshold", "must be between 1 and 50"));
        }
        Ok(())
    }
}

/// Backoff and retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter band half-width, 0.0 - 1.0
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_MAX_RETRIES,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            jitter_factor: defaults::RETRY_JITTER_FACTOR,
        }
    }
}

impl BackoffConfig {
    /// Convert to resilience module's format
    pub fn to_retry_config(&self) -> crate::resilience::config::RetryConfig {
        crate::resilience::config::RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_factor: self.jitter_factor,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.base_delay_ms",
                format!(
                    "{} must not exceed max_delay_ms ({})",
                    self.base_delay_ms, self.max_delay_ms
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "backoff.jitter_factor",
                format!("must be between 0.0 and 1.0, got {}", self.jitter_factor),
            ));
        }
        if self.max_retries > 20 {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_retries",
                "must not exceed 20",
            ));
        }
        Ok(())
    }
}

/// Strategy selector for resolving queued mutations against server state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    #[default]
    ServerWins,
    ClientWins,
    /// Requires a caller-supplied merge function at repository construction
    Merge,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub conflict_resolution: ConflictResolution,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
        }
    }
}

impl PaginationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "pagination.page_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
