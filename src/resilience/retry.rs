//! # Retry Policy
//!
//! Exponential backoff with uniform jitter around a caller-supplied
//! retryability predicate. The policy engine itself never decides which
//! failure kinds are transient; [`retry_on_kinds`] and
//! [`TRANSIENT_FAILURE_KINDS`] exist for callers that want the usual set.
//!
//! `delay(attempt) = clamp(base_delay * 2^attempt * jitter, base_delay, max_delay)`
//! with `jitter` drawn uniformly from `[1 - jitter_factor, 1 + jitter_factor]`.

use crate::error::{Failure, FailureKind};
use crate::outcome::Outcome;
use crate::resilience::RetryConfig;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exponent cap; `2^32 * base_delay` is past any sane `max_delay`
const MAX_BACKOFF_EXPONENT: u32 = 32;

/// Decides whether a failure is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

/// Failure kinds usually treated as transient
pub const TRANSIENT_FAILURE_KINDS: [FailureKind; 4] = [
    FailureKind::Network,
    FailureKind::Timeout,
    FailureKind::Server,
    FailureKind::RateLimit,
];

/// Predicate retrying exactly the given failure kinds
pub fn retry_on_kinds(kinds: &[FailureKind]) -> RetryPredicate {
    let kinds = kinds.to_vec();
    Arc::new(move |failure: &Failure| kinds.contains(&failure.kind()))
}

/// Backoff calculator plus retry loop
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    predicate: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new<P>(config: RetryConfig, predicate: P) -> Self
    where
        P: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        Self {
            config,
            predicate: Arc::new(predicate),
        }
    }

    pub fn with_predicate(config: RetryConfig, predicate: RetryPredicate) -> Self {
        Self { config, predicate }
    }

    /// Policy retrying [`TRANSIENT_FAILURE_KINDS`]
    pub fn transient(config: RetryConfig) -> Self {
        Self::with_predicate(config, retry_on_kinds(&TRANSIENT_FAILURE_KINDS))
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `attempt` (0-based), with fresh jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_multiplier(attempt, self.jitter_multiplier())
    }

    /// Delay for an explicit jitter multiplier
    pub fn delay_with_multiplier(&self, attempt: u32, multiplier: f64) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT) as i32;

        let raw = base * 2f64.powi(exponent) * multiplier;
        let clamped = raw.max(base).min(max);

        Duration::try_from_secs_f64(clamped)
            .unwrap_or(self.config.max_delay)
            .max(self.config.base_delay)
            .min(self.config.max_delay)
    }

    /// Uniform draw from `[1 - jitter_factor, 1 + jitter_factor]`
    pub fn jitter_multiplier(&self) -> f64 {
        let factor = self.config.jitter_factor.clamp(0.0, 1.0);
        if factor == 0.0 {
            return 1.0;
        }
        1.0 + (fastrand::f64() * 2.0 - 1.0) * factor
    }

    /// Whether a failure observed after `retries_so_far` retries gets another attempt
    pub fn should_retry(&self, failure: &Failure, retries_so_far: u32) -> bool {
        retries_so_far < self.config.max_retries && (self.predicate)(failure)
    }

    /// Wait before the next attempt, honouring a rate-limit hint up to `max_delay`
    fn wait_before_retry(&self, failure: &Failure, retries_so_far: u32) -> Duration {
        let backoff = self.delay(retries_so_far);
        match failure.retry_after() {
            Some(hint) => backoff.max(hint.min(self.config.max_delay)),
            None => backoff,
        }
    }

    /// Run `operation`, re-invoking it from scratch on retryable failures
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        self.run(operation, None).await
    }

    /// Like [`execute`](Self::execute), but a cancelled token stops any
    /// pending retry before it fires.
    ///
    /// The failure observed last is returned unchanged on cancellation. An
    /// attempt already in flight is allowed to finish.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        self.run(operation, Some(cancel)).await
    }

    async fn run<T, F, Fut>(
        &self,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(
                Failure::unexpected("Retry cancelled before first attempt").with_code("CANCELLED"),
            );
        }

        let mut retries = 0u32;
        loop {
            let failure = match operation().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if !self.should_retry(&failure, retries) {
                if retries > 0 {
                    warn!(
                        retries = retries,
                        failure_kind = %failure.kind(),
                        "❌ Giving up after retries"
                    );
                }
                return Err(failure);
            }

            let wait = self.wait_before_retry(&failure, retries);
            debug!(
                retry = retries + 1,
                max_retries = self.config.max_retries,
                delay_ms = wait.as_millis() as u64,
                failure_kind = %failure.kind(),
                "🔁 Retrying after failure"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(retries = retries, "Retry cancelled while backing off");
                            return Err(failure);
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }

            retries += 1;
        }
    }
}
