#![allow(clippy::doc_markdown)] // Allow technical terms like LRU, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Strata Core
//!
//! Resilient, cached access to remote resources.
//!
//! ## Overview
//!
//! Strata Core is a set of small composable primitives that together give an
//! application fault-tolerant data access: every operation returns an
//! [`Outcome`], reads are served from the fastest tier that has a fresh copy,
//! and a failing remote degrades to stale data instead of an error whenever
//! stale data exists.
//!
//! ## Module Organization
//!
//! - [`outcome`] / [`error`] - `Outcome<T>` and the closed [`Failure`] taxonomy
//! - [`cache`] - TTL cache stores (unbounded with sweep, bounded LRU)
//! - [`resilience`] - Circuit breakers, breaker registry and retry with backoff
//! - [`repository`] - Repository contract, tiered orchestration and offline sync
//! - [`pagination`] - Infinite-scroll pagination controller
//! - [`config`] - Configuration records and the YAML loader
//! - [`logging`] - Structured logging setup and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_core::config::StrataConfig;
//! use strata_core::resilience::{CircuitBreakerRegistry, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! strata_core::logging::init_structured_logging();
//!
//! let config = StrataConfig::default();
//! config.validate()?;
//!
//! let registry = CircuitBreakerRegistry::from_config(&config.circuit_breakers);
//! let retry = RetryPolicy::transient(config.backoff.to_retry_config());
//! let breaker = registry.get_circuit_breaker("users_api");
//!
//! let outcome = retry
//!     .execute(|| breaker.call(|| async { Ok::<_, strata_core::Failure>(42) }))
//!     .await;
//! assert_eq!(outcome, Ok(42));
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod outcome;
pub mod pagination;
pub mod repository;
pub mod resilience;

pub use cache::{CacheLookup, CacheStats, CacheStore, LruCacheStore, MemoryCacheStore};
pub use config::{ConfigLoader, ConfigurationError, ConflictResolution, StrataConfig};
pub use error::{Failure, FailureKind, FieldError};
pub use outcome::{Outcome, OutcomeExt};
pub use pagination::{PageSource, PaginationController, PaginationState, PaginationStatus};
pub use repository::{
    DataSource, Entity, Fetched, ListQuery, Page, Repository, ResilientRemote, TieredRepository,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitState, RetryConfig, RetryPolicy,
};
