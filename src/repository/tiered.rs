//! # Tiered Repository
//!
//! Reads go cache → local → remote and fall back to whatever stale copy is
//! at hand when the remote fails. Writes go to the remote first and, once it
//! accepts them, update the local tier and the caches.

use super::local::InMemoryLocalStore;
use super::remote::ResilientRemote;
use super::sync::{ConflictStrategy, MergeFn, PendingMutation};
use super::traits::{Entity, JsonCodec, LocalStore, Repository, WireCodec};
use super::types::{DataSource, Fetched, ListQuery, Page, RequestDescriptor};
use crate::cache::{store_from_config, CacheLookup, CacheStore};
use crate::config::{CacheConfig, ConfigResult, ConflictResolution, StrataConfig};
use crate::constants::cache_keys;
use crate::logging::{log_error, log_repository_operation};
use crate::outcome::Outcome;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Repository over a cache tier, a local tier and a remote tier
pub struct TieredRepository<T: Entity> {
    pub(super) cache: Arc<dyn CacheStore<T>>,
    page_cache: Arc<dyn CacheStore<Page<T>>>,
    pub(super) local: Arc<dyn LocalStore<T>>,
    pub(super) remote: ResilientRemote,
    pub(super) codec: Arc<dyn WireCodec<T>>,
    pub(super) resource_path: String,
    pub(super) cache_ttl: Option<Duration>,
    pub(super) conflict_strategy: ConflictStrategy<T>,
    pub(super) pending: parking_lot::Mutex<VecDeque<PendingMutation<T>>>,
    pub(super) sync_lock: tokio::sync::Mutex<()>,
    snapshots: watch::Sender<Vec<T>>,
}

impl<T: Entity> std::fmt::Debug for TieredRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredRepository")
            .field("entity_type", &T::entity_type())
            .field("resource_path", &self.resource_path)
            .field("cache", &self.cache.store_name())
            .field("remote", &self.remote)
            .field("conflict_strategy", &self.conflict_strategy)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

/// Builder for [`TieredRepository`]; unset tiers get the bundled defaults
pub struct TieredRepositoryBuilder<T: Entity> {
    remote: ResilientRemote,
    resource_path: String,
    local: Option<Arc<dyn LocalStore<T>>>,
    cache: Option<Arc<dyn CacheStore<T>>>,
    page_cache: Option<Arc<dyn CacheStore<Page<T>>>>,
    codec: Option<Arc<dyn WireCodec<T>>>,
    cache_config: CacheConfig,
    conflict_resolution: ConflictResolution,
    merge_fn: Option<MergeFn<T>>,
}

impl<T: Entity> TieredRepositoryBuilder<T> {
    /// Take cache and conflict settings from a loaded configuration
    pub fn with_config(mut self, config: &StrataConfig) -> Self {
        self.cache_config = config.cache.clone();
        self.conflict_resolution = config.sync.conflict_resolution;
        self
    }

    pub fn cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = cache_config;
        self
    }

    pub fn local_store(mut self, local: Arc<dyn LocalStore<T>>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn cache_store(mut self, cache: Arc<dyn CacheStore<T>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn page_cache_store(mut self, page_cache: Arc<dyn CacheStore<Page<T>>>) -> Self {
        self.page_cache = Some(page_cache);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn WireCodec<T>>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn conflict_resolution(mut self, selector: ConflictResolution) -> Self {
        self.conflict_resolution = selector;
        self
    }

    /// Merge function used when the selector is `Merge`
    pub fn merge_with<F>(mut self, merge: F) -> Self
    where
        F: Fn(&T, &T) -> T + Send + Sync + 'static,
    {
        self.merge_fn = Some(Arc::new(merge));
        self
    }

    pub fn build(self) -> ConfigResult<TieredRepository<T>> {
        self.cache_config.validate()?;
        let conflict_strategy =
            ConflictStrategy::from_config(self.conflict_resolution, self.merge_fn)?;

        let cache = self
            .cache
            .unwrap_or_else(|| store_from_config(&self.cache_config));
        let page_cache = self
            .page_cache
            .unwrap_or_else(|| store_from_config(&self.cache_config));
        let local = self
            .local
            .unwrap_or_else(|| Arc::new(InMemoryLocalStore::new()));
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec::new()));
        let (snapshots, _) = watch::channel(Vec::new());

        debug!(
            entity_type = T::entity_type(),
            resource_path = %self.resource_path,
            cache = cache.store_name(),
            strategy = ?conflict_strategy,
            "Tiered repository built"
        );

        Ok(TieredRepository {
            cache,
            page_cache,
            local,
            remote: self.remote,
            codec,
            resource_path: self.resource_path.trim_end_matches('/').to_string(),
            cache_ttl: self.cache_config.default_ttl(),
            conflict_strategy,
            pending: parking_lot::Mutex::new(VecDeque::new()),
            sync_lock: tokio::sync::Mutex::new(()),
            snapshots,
        })
    }
}

impl<T: Entity> TieredRepository<T> {
    /// Start building a repository for the collection at `resource_path`
    pub fn builder(
        remote: ResilientRemote,
        resource_path: impl Into<String>,
    ) -> TieredRepositoryBuilder<T> {
        TieredRepositoryBuilder {
            remote,
            resource_path: resource_path.into(),
            local: None,
            cache: None,
            page_cache: None,
            codec: None,
            cache_config: CacheConfig::default(),
            conflict_resolution: ConflictResolution::default(),
            merge_fn: None,
        }
    }

    pub fn remote(&self) -> &ResilientRemote {
        &self.remote
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore<T>> {
        &self.cache
    }

    pub fn local(&self) -> &Arc<dyn LocalStore<T>> {
        &self.local
    }

    /// `get_by_id`, reporting which tier answered
    pub async fn get_by_id_with_source(&self, id: &str) -> Outcome<Fetched<T>> {
        let key = self.entity_key(id);
        let stale = match self.cache.lookup(&key) {
            CacheLookup::Fresh(entity) => {
                debug!(entity_type = T::entity_type(), entity_id = %id, "Cache hit");
                return Ok(Fetched::new(entity, DataSource::Cache));
            }
            CacheLookup::Stale(entity) => Some(entity),
            CacheLookup::Miss => None,
        };

        if let Some(entity) = self.read_local(id).await {
            self.cache.set(&key, entity.clone(), self.cache_ttl);
            return Ok(Fetched::new(entity, DataSource::Local));
        }

        match self.fetch_remote(id).await {
            Ok(entity) => {
                if self.absorb_remote(&entity).await {
                    self.publish_snapshot().await;
                }
                Ok(Fetched::new(entity, DataSource::Remote))
            }
            Err(failure) => match stale {
                Some(entity) => {
                    self.log_degraded("get_by_id", Some(id), DataSource::DegradedCache, &failure);
                    Ok(Fetched::new(entity, DataSource::DegradedCache))
                }
                None => Err(failure),
            },
        }
    }

    /// `get_all`, reporting which tier answered
    pub async fn get_all_with_source(&self, query: &ListQuery) -> Outcome<Fetched<Page<T>>> {
        let key = query.cache_key(T::entity_type());
        let stale = match self.page_cache.lookup(&key) {
            CacheLookup::Fresh(page) => return Ok(Fetched::new(page, DataSource::Cache)),
            CacheLookup::Stale(page) => Some(page),
            CacheLookup::Miss => None,
        };

        let failure = match self.fetch_remote_page(query).await {
            Ok(page) => {
                let changed = self.differing_from_local(&page.items).await;
                let local_changed = !changed.is_empty();
                if local_changed {
                    if let Err(failure) = self.local.put_many(changed).await {
                        log_error(
                            "tiered_repository",
                            "get_all",
                            failure.message(),
                            Some("local write-through failed"),
                        );
                    }
                }
                for entity in &page.items {
                    self.cache
                        .set(&self.entity_key(&entity.id()), entity.clone(), self.cache_ttl);
                }
                self.page_cache.set(&key, page.clone(), self.cache_ttl);
                if local_changed {
                    self.publish_snapshot().await;
                }
                return Ok(Fetched::new(page, DataSource::Remote));
            }
            Err(failure) => failure,
        };

        if let Some(page) = stale {
            self.log_degraded("get_all", None, DataSource::DegradedCache, &failure);
            return Ok(Fetched::new(page, DataSource::DegradedCache));
        }

        match self.local.query(query).await {
            Ok(page) if !page.items.is_empty() => {
                self.log_degraded("get_all", None, DataSource::DegradedLocal, &failure);
                Ok(Fetched::new(page, DataSource::DegradedLocal))
            }
            _ => Err(failure),
        }
    }

    /// Fetch from the remote, skipping cache and local; falls back to the
    /// local copy, then a cached copy, when the remote fails
    pub async fn refresh_by_id(&self, id: &str) -> Outcome<Fetched<T>> {
        let failure = match self.fetch_remote(id).await {
            Ok(entity) => {
                if self.absorb_remote(&entity).await {
                    self.after_local_change().await;
                }
                return Ok(Fetched::new(entity, DataSource::Remote));
            }
            Err(failure) => failure,
        };

        if let Some(entity) = self.read_local(id).await {
            self.log_degraded("refresh_by_id", Some(id), DataSource::DegradedLocal, &failure);
            return Ok(Fetched::new(entity, DataSource::DegradedLocal));
        }

        match self.cache.lookup(&self.entity_key(id)).into_value() {
            Some(entity) => {
                self.log_degraded("refresh_by_id", Some(id), DataSource::DegradedCache, &failure);
                Ok(Fetched::new(entity, DataSource::DegradedCache))
            }
            None => Err(failure),
        }
    }

    /// Drop this entity type's cached entities and pages
    pub fn invalidate_cache(&self) {
        let entities = self
            .cache
            .invalidate_prefix(&format!("{}:{}:", cache_keys::ENTITY_PREFIX, T::entity_type()));
        let pages = self.invalidate_pages();
        debug!(
            entity_type = T::entity_type(),
            entities = entities,
            pages = pages,
            "Cache invalidated"
        );
    }

    /// Re-read the local tier and publish it to `watch_all` subscribers
    pub async fn publish_snapshot(&self) {
        match self.local.all().await {
            Ok(all) => {
                self.snapshots.send_replace(all);
            }
            Err(failure) => warn!(
                entity_type = T::entity_type(),
                error = %failure,
                "Could not read local tier for snapshot"
            ),
        }
    }

    pub(super) fn entity_key(&self, id: &str) -> String {
        format!("{}:{}:{id}", cache_keys::ENTITY_PREFIX, T::entity_type())
    }

    pub(super) fn entity_path(&self, id: &str) -> String {
        format!("{}/{id}", self.resource_path)
    }

    pub(super) fn invalidate_pages(&self) -> usize {
        self.page_cache
            .invalidate_prefix(&format!("{}:{}:", cache_keys::PAGE_PREFIX, T::entity_type()))
    }

    pub(super) async fn fetch_remote(&self, id: &str) -> Outcome<T> {
        let response = self
            .remote
            .invoke(RequestDescriptor::get(self.entity_path(id)))
            .await?;
        self.codec.from_wire(&response)
    }

    async fn fetch_remote_page(&self, query: &ListQuery) -> Outcome<Page<T>> {
        let mut request = RequestDescriptor::get(self.resource_path.clone())
            .with_query("page", query.page.to_string())
            .with_query("page_size", query.page_size.to_string());
        for (field, value) in &query.filters {
            request = request.with_query(field.clone(), value.clone());
        }
        if let Some(sort) = &query.sort {
            request = request.with_query("sort", sort.to_param());
        }

        let response = self.remote.invoke(request).await?;
        self.codec.from_wire_page(&response, query)
    }

    /// Local lookup where a read error counts as a miss
    async fn read_local(&self, id: &str) -> Option<T> {
        match self.local.get(id).await {
            Ok(found) => found,
            Err(failure) => {
                warn!(
                    entity_type = T::entity_type(),
                    entity_id = %id,
                    error = %failure,
                    "Local read failed, treating as miss"
                );
                None
            }
        }
    }

    /// Store a remote-confirmed entity locally and in the entity cache.
    ///
    /// The remote already holds the write, so local failures are only logged.
    pub(super) async fn write_through(&self, entity: &T) {
        let id = entity.id();
        if let Err(failure) = self.local.put(entity.clone()).await {
            log_error(
                "tiered_repository",
                "write_through",
                failure.message(),
                Some(&format!("{}:{id}", T::entity_type())),
            );
        }
        self.cache.set(&self.entity_key(&id), entity.clone(), self.cache_ttl);
    }

    /// Entities whose local copy is missing or has different content
    async fn differing_from_local(&self, entities: &[T]) -> Vec<T> {
        let mut changed = Vec::new();
        for entity in entities {
            let same = match self.read_local(&entity.id()).await {
                Some(current) => same_content(&current, entity),
                None => false,
            };
            if !same {
                changed.push(entity.clone());
            }
        }
        changed
    }

    /// Cache a remote read and store it locally if it differs; returns
    /// whether the local tier changed
    async fn absorb_remote(&self, entity: &T) -> bool {
        if self.differing_from_local(std::slice::from_ref(entity)).await.is_empty() {
            self.cache
                .set(&self.entity_key(&entity.id()), entity.clone(), self.cache_ttl);
            return false;
        }
        self.write_through(entity).await;
        true
    }

    pub(super) async fn remove_local(&self, id: &str) {
        if let Err(failure) = self.local.delete(id).await {
            log_error(
                "tiered_repository",
                "remove_local",
                failure.message(),
                Some(&format!("{}:{id}", T::entity_type())),
            );
        }
        self.cache.invalidate(&self.entity_key(id));
    }

    /// Pages may now be out of date; subscribers get the new local state
    pub(super) async fn after_local_change(&self) {
        self.invalidate_pages();
        self.publish_snapshot().await;
    }

    fn log_degraded(
        &self,
        operation: &str,
        id: Option<&str>,
        source: DataSource,
        failure: &crate::error::Failure,
    ) {
        warn!(
            entity_type = T::entity_type(),
            entity_id = id,
            source = source.as_str(),
            failure_kind = %failure.kind(),
            "🟡 Remote failed, serving degraded result"
        );
        log_repository_operation(
            operation,
            T::entity_type(),
            id,
            source.as_str(),
            "DEGRADED",
            Some(failure.message()),
        );
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for TieredRepository<T> {
    async fn get_by_id(&self, id: &str) -> Outcome<T> {
        self.get_by_id_with_source(id).await.map(Fetched::into_value)
    }

    async fn get_all(&self, query: &ListQuery) -> Outcome<Page<T>> {
        self.get_all_with_source(query).await.map(Fetched::into_value)
    }

    async fn create(&self, entity: T) -> Outcome<T> {
        let body = self.codec.to_wire(&entity)?;
        let response = self
            .remote
            .invoke(RequestDescriptor::post(self.resource_path.clone(), body))
            .await?;
        let created = self.codec.from_wire(&response)?;

        self.write_through(&created).await;
        self.after_local_change().await;
        log_repository_operation(
            "create",
            T::entity_type(),
            Some(&created.id()),
            DataSource::Remote.as_str(),
            "SUCCESS",
            None,
        );
        Ok(created)
    }

    async fn update(&self, entity: T) -> Outcome<T> {
        let body = self.codec.to_wire(&entity)?;
        let response = self
            .remote
            .invoke(RequestDescriptor::put(self.entity_path(&entity.id()), body))
            .await?;
        let updated = self.codec.from_wire(&response)?;

        self.write_through(&updated).await;
        self.after_local_change().await;
        log_repository_operation(
            "update",
            T::entity_type(),
            Some(&updated.id()),
            DataSource::Remote.as_str(),
            "SUCCESS",
            None,
        );
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Outcome<()> {
        self.remote
            .invoke(RequestDescriptor::delete(self.entity_path(id)))
            .await?;

        self.remove_local(id).await;
        self.after_local_change().await;
        log_repository_operation(
            "delete",
            T::entity_type(),
            Some(id),
            DataSource::Remote.as_str(),
            "SUCCESS",
            None,
        );
        Ok(())
    }

    /// Creates one at a time; stops at the first failure, keeping earlier creates
    async fn create_many(&self, entities: Vec<T>) -> Outcome<Vec<T>> {
        let mut created = Vec::with_capacity(entities.len());
        for entity in entities {
            created.push(self.create(entity).await?);
        }
        Ok(created)
    }

    /// Deletes one at a time; stops at the first failure, keeping earlier deletes
    async fn delete_many(&self, ids: &[String]) -> Outcome<()> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    fn watch_all(&self) -> BoxStream<'static, Vec<T>> {
        let receiver = self.snapshots.subscribe();
        stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let snapshot = receiver.borrow_and_update().clone();
            Some((snapshot, (receiver, false)))
        })
        .boxed()
    }
}

fn same_content<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationError;
    use crate::repository::traits::RemoteClient;
    use crate::repository::types::RemoteResponse;
    use crate::resilience::{RetryConfig, RetryPolicy};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
    }

    impl Entity for Item {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn entity_type() -> &'static str {
            "item"
        }
    }

    struct Unreachable;

    #[async_trait]
    impl RemoteClient for Unreachable {
        async fn invoke(&self, _request: RequestDescriptor) -> Outcome<RemoteResponse> {
            Err(crate::error::Failure::network("offline"))
        }
    }

    struct Serving;

    #[async_trait]
    impl RemoteClient for Serving {
        async fn invoke(&self, request: RequestDescriptor) -> Outcome<RemoteResponse> {
            Ok(match request.path.as_str() {
                "/items/1" => RemoteResponse::ok(serde_json::json!({"id": "1"})),
                _ => RemoteResponse::ok(serde_json::json!({
                    "items": [{"id": "1"}, {"id": "2"}],
                    "total": 2
                })),
            })
        }
    }

    fn remote() -> ResilientRemote {
        ResilientRemote::without_breaker(
            Arc::new(Unreachable),
            "items_api",
            RetryPolicy::transient(RetryConfig::none()),
        )
    }

    #[tokio::test]
    async fn test_builder_requires_merge_fn_for_merge() {
        let result = TieredRepository::<Item>::builder(remote(), "/items")
            .conflict_resolution(ConflictResolution::Merge)
            .build();
        assert!(matches!(result, Err(ConfigurationError::MissingMergeFunction)));

        let repo = TieredRepository::<Item>::builder(remote(), "/items/")
            .conflict_resolution(ConflictResolution::Merge)
            .merge_with(|_, server| server.clone())
            .build()
            .unwrap();
        assert_eq!(repo.conflict_strategy().selector(), ConflictResolution::Merge);
        assert_eq!(repo.entity_path("7"), "/items/7");
    }

    #[tokio::test]
    async fn test_builder_applies_config() {
        let mut config = StrataConfig::for_test();
        config.sync.conflict_resolution = ConflictResolution::ClientWins;
        config.cache.max_size = None;

        let repo = TieredRepository::<Item>::builder(remote(), "/items")
            .with_config(&config)
            .build()
            .unwrap();

        assert_eq!(repo.cache().store_name(), "memory");
        assert_eq!(repo.cache_ttl, config.cache.default_ttl());
        assert_eq!(
            repo.conflict_strategy().selector(),
            ConflictResolution::ClientWins
        );
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_cache_config() {
        let result = TieredRepository::<Item>::builder(remote(), "/items")
            .cache_config(CacheConfig {
                max_size: Some(0),
                ..CacheConfig::default()
            })
            .build();
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_cache_keys_are_namespaced() {
        let repo = TieredRepository::<Item>::builder(remote(), "/items")
            .build()
            .unwrap();
        assert_eq!(repo.entity_key("1"), "entity:item:1");

        repo.cache.insert(&repo.entity_key("1"), Item { id: "1".into() });
        repo.page_cache.insert(
            &ListQuery::default().cache_key("item"),
            Page::new(vec![], 1, 20, 0),
        );
        repo.invalidate_cache();
        assert!(repo.cache.is_empty());
        assert!(repo.page_cache.is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_remote_reads_do_not_publish() {
        let serving = ResilientRemote::without_breaker(
            Arc::new(Serving),
            "items_api",
            RetryPolicy::transient(RetryConfig::none()),
        );
        let repo = TieredRepository::<Item>::builder(serving, "/items")
            .build()
            .unwrap();
        let mut snapshots = repo.snapshots.subscribe();

        repo.refresh_by_id("1").await.unwrap();
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(snapshots.borrow_and_update().len(), 1);

        repo.refresh_by_id("1").await.unwrap();
        assert!(!snapshots.has_changed().unwrap());

        repo.get_all(&ListQuery::default()).await.unwrap();
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(snapshots.borrow_and_update().len(), 2);

        repo.invalidate_cache();
        let page = repo.get_all_with_source(&ListQuery::default()).await.unwrap();
        assert_eq!(page.source, DataSource::Remote);
        assert!(!snapshots.has_changed().unwrap());
    }
}
