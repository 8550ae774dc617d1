//! # Circuit Breaker Implementation
//!
//! Fault isolation for a single remote endpoint, following the classic
//! pattern with three states: Closed (normal operation), Open (failing fast),
//! and Half-Open (letting a single trial call test recovery).
//!
//! All bookkeeping lives behind one `parking_lot::Mutex` that is never held
//! across an `.await`; the current state is mirrored into an atomic so
//! [`CircuitBreaker::state`] is lock-free.

use crate::error::Failure;
use crate::outcome::Outcome;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - one trial call at a time
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
    /// Set while the single half-open trial is executing
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Core circuit breaker guarding one logical endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Lock-free mirror of `inner.state`
    state: AtomicU8,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerInner>,
}

/// Admission ticket for one call; releases the half-open trial slot on drop,
/// including when the caller abandons the call mid-flight.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.trial {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_time: None,
                trial_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// When the circuit rejects the call the operation is never invoked and
    /// a [`Failure::CircuitOpen`] is returned. Otherwise the operation's own
    /// outcome is returned unchanged after being recorded.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        let Some(permit) = self.try_acquire() else {
            return Err(Failure::circuit_open(&self.name));
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => self.record_success(duration, permit.trial),
            Err(failure) => self.record_failure(duration, failure, permit.trial),
        }

        drop(permit);
        result
    }

    /// Decide whether a call may run, moving Open to HalfOpen once the timeout has elapsed
    fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Some(CallPermit {
                breaker: self,
                trial: false,
            }),
            CircuitState::Open => {
                let timed_out = match inner.last_failure_time {
                    Some(failed_at) => failed_at.elapsed() >= self.config.timeout,
                    None => {
                        warn!(component = %self.name, "Circuit open but no failure time recorded");
                        true
                    }
                };

                if timed_out {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Some(CallPermit {
                        breaker: self,
                        trial: true,
                    })
                } else {
                    inner.metrics.rejected_count += 1;
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.metrics.rejected_count += 1;
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(CallPermit {
                        breaker: self,
                        trial: true,
                    })
                }
            }
        }
    }

    /// `trial` marks the half-open trial call; only its result moves a
    /// half-open circuit.
    fn record_success(&self, duration: Duration, trial: bool) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;
        inner.consecutive_failures = 0;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {}
            CircuitState::HalfOpen | CircuitState::Open => {
                // Admitted before the circuit opened
                debug!(component = %self.name, "Success of a pre-open call ignored");
            }
        }
    }

    fn record_failure(&self, duration: Duration, failure: &Failure, trial: bool) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;
        inner.last_failure_time = Some(Instant::now());

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            failure_kind = %failure.kind(),
            "🔴 Operation failed"
        );

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.consecutive_failures += 1;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    /// Apply a state change; the caller holds the lock
    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        self.state.store(to as u8, Ordering::Release);

        match to {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.consecutive_successes = 0;
                inner.last_failure_time = None;
                info!(
                    component = %self.name,
                    from = ?from,
                    total_calls = inner.metrics.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Open => {
                inner.consecutive_successes = 0;
                if inner.last_failure_time.is_none() {
                    inner.last_failure_time = Some(Instant::now());
                }
                error!(
                    component = %self.name,
                    from = ?from,
                    consecutive_failures = inner.consecutive_failures,
                    failure_threshold = self.config.failure_threshold,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "🔴 Circuit breaker opened (failing fast)"
                );
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes = 0;
                info!(
                    component = %self.name,
                    success_threshold = self.config.success_threshold,
                    "🟡 Circuit breaker half-open (testing recovery)"
                );
            }
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(Instant::now());
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            current_state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            ..inner.metrics.clone()
        }
        .with_derived()
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let inner = self.inner.lock();
        if inner.metrics.total_calls < 10 {
            // Too few calls to judge
            return true;
        }

        let failure_rate = inner.metrics.failure_count as f64 / inner.metrics.total_calls as f64;
        failure_rate < 0.1
    }
}
