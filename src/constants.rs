//! # System Constants
//!
//! Default values and well-known names shared across the data layer.

/// Defaults used when a configuration section is omitted
pub mod defaults {
    /// Cache entries live five minutes unless configured otherwise
    pub const CACHE_TTL_SECONDS: u64 = 300;
    pub const CACHE_MAX_SIZE: usize = 1000;
    pub const CACHE_CLEANUP_INTERVAL_SECONDS: u64 = 60;

    pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
    pub const CIRCUIT_SUCCESS_THRESHOLD: u32 = 2;
    pub const CIRCUIT_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_CIRCUIT_BREAKERS: usize = 50;

    pub const RETRY_MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 200;
    pub const RETRY_MAX_DELAY_MS: u64 = 10_000;
    pub const RETRY_JITTER_FACTOR: f64 = 0.2;

    pub const PAGE_SIZE: u32 = 20;
}

/// Environment names recognised by the configuration loader
pub mod environments {
    pub const DEVELOPMENT: &str = "development";
    pub const TEST: &str = "test";
    pub const PRODUCTION: &str = "production";

    pub const ALL: [&str; 3] = [DEVELOPMENT, TEST, PRODUCTION];
}

/// Environment variables consulted for the active environment name
pub const ENVIRONMENT_VARIABLES: [&str; 2] = ["STRATA_ENV", "APP_ENV"];

/// File names searched for by the configuration loader, in order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["strata-config.yaml", "strata-config.yml"];

/// Cache key namespaces used by the tiered repository
pub mod cache_keys {
    pub const ENTITY_PREFIX: &str = "entity";
    pub const PAGE_PREFIX: &str = "page";
}
