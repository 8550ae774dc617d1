//! # Repository Layer
//!
//! Uniform, [`Outcome`](crate::outcome::Outcome)-returning data access over
//! three tiers:
//!
//! - a [`CacheStore`](crate::cache::CacheStore) for entities and pages
//! - a [`LocalStore`] persisting entities on this side of the network
//! - a [`RemoteClient`] reached through a [`ResilientRemote`] (circuit breaker + retry)
//!
//! [`TieredRepository`] orchestrates them and serves degraded results from
//! stale copies when the remote tier is unavailable. Offline mutations can be
//! queued and replayed later with [`TieredRepository::sync`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_core::config::StrataConfig;
//! use strata_core::repository::{Repository, ResilientRemote, TieredRepository};
//! use strata_core::resilience::{CircuitBreakerRegistry, RetryPolicy};
//! # use strata_core::repository::{Entity, RemoteClient, RemoteResponse, RequestDescriptor};
//! # use strata_core::Outcome;
//! # #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! # struct User { id: String }
//! # impl Entity for User {
//! #     fn id(&self) -> String { self.id.clone() }
//! #     fn entity_type() -> &'static str { "user" }
//! # }
//! # struct Http;
//! # #[async_trait::async_trait]
//! # impl RemoteClient for Http {
//! #     async fn invoke(&self, _r: RequestDescriptor) -> Outcome<RemoteResponse> { unimplemented!() }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StrataConfig::default();
//! let registry = CircuitBreakerRegistry::from_config(&config.circuit_breakers);
//! let retry = RetryPolicy::transient(config.backoff.to_retry_config());
//! let remote = ResilientRemote::new(Arc::new(Http), &registry, "users_api", retry);
//!
//! let users = TieredRepository::<User>::builder(remote, "/users")
//!     .with_config(&config)
//!     .build()?;
//! let user = users.get_by_id("42").await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod local;
pub mod remote;
pub mod sync;
pub mod tiered;
pub mod traits;
pub mod types;

pub use local::InMemoryLocalStore;
pub use remote::ResilientRemote;
pub use sync::{
    diverged, ConflictStrategy, MergeFn, MutationKind, PendingMutation, Resolution, SyncReport,
};
pub use tiered::{TieredRepository, TieredRepositoryBuilder};
pub use traits::{Entity, JsonCodec, LocalStore, RemoteClient, Repository, WireCodec};
pub use types::{
    DataSource, Fetched, ListQuery, Page, RemoteResponse, RequestDescriptor, RequestMethod,
    SortDirection, SortSpec,
};
