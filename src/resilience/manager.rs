//! # Circuit Breaker Registry
//!
//! Owns one circuit breaker per remote endpoint. A registry is an ordinary
//! value handed to the components that need it; cloning it shares the same
//! set of breakers.

use crate::config::CircuitBreakerConfig;
use crate::resilience::{CircuitBreaker, SystemCircuitBreakerMetrics};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of circuit breakers keyed by endpoint name
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    circuit_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,

    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        info!(
            default_failure_threshold = config.default_config.failure_threshold,
            component_overrides = config.component_configs.len(),
            "Initializing circuit breaker registry"
        );

        Self {
            circuit_breakers: Arc::new(DashMap::new()),
            config: config.clone(),
        }
    }

    /// Whether remote calls should be routed through breakers at all
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get or create the circuit breaker for an endpoint
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.get(component_name) {
            return Arc::clone(breaker.value());
        }

        let max_allowed = self.config.global_settings.max_circuit_breakers;
        let breaker = self
            .circuit_breakers
            .entry(component_name.to_string())
            .or_insert_with(|| {
                let component_config = self
                    .config
                    .config_for_component(component_name)
                    .to_resilience_config();
                Arc::new(CircuitBreaker::new(component_name, component_config))
            })
            .value()
            .clone();

        let total = self.circuit_breakers.len();
        if total > max_allowed {
            warn!(
                component = component_name,
                current_count = total,
                max_allowed = max_allowed,
                "🚨 Circuit breaker limit exceeded"
            );
        }

        breaker
    }

    pub fn list_components(&self) -> Vec<String> {
        self.circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Overall health based on circuit breaker states (0.0 to 1.0)
    pub fn system_health_score(&self) -> f64 {
        self.get_system_metrics().health_score()
    }
}
