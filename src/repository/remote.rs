//! Remote tier wrapped in a circuit breaker and a retry policy

use super::traits::RemoteClient;
use super::types::{RemoteResponse, RequestDescriptor};
use crate::outcome::Outcome;
use crate::resilience::{CircuitBreaker, CircuitBreakerRegistry, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Remote client guarded by the endpoint's breaker and retried on transient failures.
///
/// Retry wraps the breaker: every retry goes through the breaker again, and a
/// `CircuitOpen` rejection is only retried if the retry predicate says so.
#[derive(Clone)]
pub struct ResilientRemote {
    client: Arc<dyn RemoteClient>,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: RetryPolicy,
    endpoint: String,
}

impl std::fmt::Debug for ResilientRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientRemote")
            .field("endpoint", &self.endpoint)
            .field("breaker", &self.breaker.as_ref().map(|b| b.state()))
            .field("retry", &self.retry)
            .finish()
    }
}

impl ResilientRemote {
    /// Use the registry's breaker for `endpoint` (none if breakers are disabled)
    pub fn new(
        client: Arc<dyn RemoteClient>,
        registry: &CircuitBreakerRegistry,
        endpoint: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let endpoint = endpoint.into();
        let breaker = registry
            .is_enabled()
            .then(|| registry.get_circuit_breaker(&endpoint));

        Self {
            client,
            breaker,
            retry,
            endpoint,
        }
    }

    /// Client with retries only
    pub fn without_breaker(
        client: Arc<dyn RemoteClient>,
        endpoint: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            breaker: None,
            retry,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub async fn invoke(&self, request: RequestDescriptor) -> Outcome<RemoteResponse> {
        self.retry.execute(|| self.attempt(request.clone())).await
    }

    /// Like [`invoke`](Self::invoke); cancelling stops pending retries
    pub async fn invoke_cancellable(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Outcome<RemoteResponse> {
        self.retry
            .execute_cancellable(|| self.attempt(request.clone()), cancel)
            .await
    }

    async fn attempt(&self, request: RequestDescriptor) -> Outcome<RemoteResponse> {
        match &self.breaker {
            Some(breaker) => breaker.call(|| self.client.invoke(request)).await,
            None => self.client.invoke(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, StrataConfig};
    use crate::error::{Failure, FailureKind};
    use crate::resilience::{CircuitState, RetryConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct AlwaysDown {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteClient for AlwaysDown {
        async fn invoke(&self, _request: RequestDescriptor) -> Outcome<RemoteResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::network("connection refused"))
        }
    }

    fn retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::transient(RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter_factor: 0.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_pass_through_breaker_until_it_opens() {
        let mut config = StrataConfig::for_test().circuit_breakers;
        config.default_config.failure_threshold = 2;
        let registry = crate::resilience::CircuitBreakerRegistry::from_config(&config);

        let client = Arc::new(AlwaysDown::default());
        let remote = ResilientRemote::new(client.clone(), &registry, "users_api", retry(5));

        let result = remote.invoke(RequestDescriptor::get("/users/1")).await;

        // Two real attempts open the circuit; the rejection is not retried
        assert_eq!(result.unwrap_err().kind(), FailureKind::CircuitOpen);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            remote.breaker().map(|b| b.state()),
            Some(CircuitState::Open)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_breakers_skip_registry() {
        let config = CircuitBreakerConfig {
            enabled: false,
            ..CircuitBreakerConfig::default()
        };
        let registry = crate::resilience::CircuitBreakerRegistry::from_config(&config);
        let client = Arc::new(AlwaysDown::default());
        let remote = ResilientRemote::new(client.clone(), &registry, "users_api", retry(2));

        let result = remote.invoke(RequestDescriptor::get("/users/1")).await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::Network);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(remote.breaker().is_none());
        assert!(registry.list_components().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_invoke_never_calls_client() {
        let client = Arc::new(AlwaysDown::default());
        let remote = ResilientRemote::without_breaker(client.clone(), "users_api", retry(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = remote
            .invoke_cancellable(RequestDescriptor::get("/users/1"), &cancel)
            .await;

        assert_eq!(result.unwrap_err().code(), Some("CANCELLED"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
