//! # Circuit Breaker Metrics
//!
//! Snapshot metrics for circuit breakers, individually and across a registry.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Number of calls that actually ran the wrapped operation
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls failed fast with `CircuitOpen` without running the operation
    pub rejected_count: u64,

    pub consecutive_failures: u32,

    /// Consecutive successful trials while half-open
    pub consecutive_successes: u32,

    /// Total duration of all executed operations
    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,

    /// Average duration of executed operations
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Fill in rates and averages from the raw counters
    pub(crate) fn with_derived(mut self) -> Self {
        if self.total_calls > 0 {
            self.failure_rate = self.failure_count as f64 / self.total_calls as f64;
            self.success_rate = self.success_count as f64 / self.total_calls as f64;
            self.average_duration = self
                .total_duration
                .checked_div(self.total_calls.min(u32::MAX as u64) as u32)
                .unwrap_or(Duration::ZERO);
        }
        self
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    /// Metrics for individual circuit breakers by name
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: chrono::Utc::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = chrono::Utc::now();
    }

    /// Calculate registry-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_metrics_creation() {
        let metrics = CircuitBreakerMetrics::new();

        assert_eq!(metrics.total_calls, 0);
        assert_eq!(metrics.rejected_count, 0);
        assert_eq!(metrics.current_state, CircuitState::Closed);
        assert!(metrics.is_healthy());
    }

    #[test]
    fn test_derived_rates() {
        let metrics = CircuitBreakerMetrics {
            total_calls: 4,
            success_count: 3,
            failure_count: 1,
            total_duration: Duration::from_millis(400),
            ..CircuitBreakerMetrics::new()
        }
        .with_derived();

        assert_eq!(metrics.failure_rate, 0.25);
        assert_eq!(metrics.success_rate, 0.75);
        assert_eq!(metrics.average_duration, Duration::from_millis(100));
    }

    #[test]
    fn test_system_metrics_aggregation() {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let users_metrics = CircuitBreakerMetrics {
            current_state: CircuitState::Closed,
            total_calls: 100,
            success_count: 95,
            failure_count: 5,
            failure_rate: 0.05,
            ..CircuitBreakerMetrics::new()
        };

        let orders_metrics = CircuitBreakerMetrics {
            current_state: CircuitState::Open,
            total_calls: 50,
            success_count: 25,
            failure_count: 25,
            failure_rate: 0.5,
            ..CircuitBreakerMetrics::new()
        };

        system_metrics.add_circuit_breaker("users_api".to_string(), users_metrics);
        system_metrics.add_circuit_breaker("orders_api".to_string(), orders_metrics);

        assert_eq!(system_metrics.health_score(), 0.5);
        assert_eq!(system_metrics.circuit_breakers.len(), 2);
    }

    #[test]
    fn test_metrics_health_calculation() {
        let mut metrics = CircuitBreakerMetrics::new();

        metrics.failure_rate = 0.05;
        assert!(metrics.is_healthy());

        metrics.failure_rate = 0.15;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::Open;
        metrics.failure_rate = 0.0;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::HalfOpen;
        assert!(metrics.is_healthy());
    }
}
