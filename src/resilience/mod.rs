//! # Resilience Module
//!
//! Fault tolerance for remote calls: circuit breakers keyed per endpoint and
//! an exponential-backoff retry policy.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: isolate a failing endpoint by failing fast
//! - **Registry**: owns one breaker per endpoint, passed to consumers
//! - **Retry Policy**: backoff with jitter around a retryability predicate
//! - **Metrics Collection**: per-breaker counters and registry health score
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strata_core::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};
//! use strata_core::Failure;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Failure> {
//! let breaker = CircuitBreaker::new("users_api", CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     timeout: Duration::from_secs(30),
//!     success_threshold: 2,
//! });
//! let retry = RetryPolicy::transient(RetryConfig::default());
//!
//! // Retry wraps the breaker, so a rejected call is never retried into an open circuit
//! let body = retry
//!     .execute(|| breaker.call(|| async { Ok::<_, Failure>("payload") }))
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod retry;


pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerConfig, RetryConfig};
pub use manager::CircuitBreakerRegistry;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use retry::{retry_on_kinds, RetryPolicy, RetryPredicate, TRANSIENT_FAILURE_KINDS};
