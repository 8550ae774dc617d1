//! # Offline Mutation Sync
//!
//! Mutations queued while offline are applied to the local tier at once and
//! replayed against the remote by [`TieredRepository::sync`], in the order
//! they were queued. When the server copy has moved on since a mutation was
//! queued, the configured [`ConflictStrategy`] decides which version is kept.
//!
//! A sync pass stops at the first failure it cannot resolve. Everything
//! replayed before that point stays committed; the failing mutation and all
//! later ones stay queued for the next pass.

use super::tiered::TieredRepository;
use super::traits::Entity;
use super::types::RequestDescriptor;
use crate::config::{ConfigResult, ConfigurationError, ConflictResolution};
use crate::error::FailureKind;
use crate::logging::log_sync_operation;
use crate::outcome::Outcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Combine a local version with the server version: `(local, server) -> merged`
pub type MergeFn<T> = Arc<dyn Fn(&T, &T) -> T + Send + Sync>;

/// How a queued mutation is reconciled with a diverged server copy
#[derive(Clone)]
pub enum ConflictStrategy<T> {
    ServerWins,
    ClientWins,
    /// Field-level precedence is up to the caller's function
    Merge(MergeFn<T>),
}

impl<T> std::fmt::Debug for ConflictStrategy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConflictStrategy::ServerWins => "ServerWins",
            ConflictStrategy::ClientWins => "ClientWins",
            ConflictStrategy::Merge(_) => "Merge(<fn>)",
        })
    }
}

/// Outcome of resolving one conflict
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Adopt the server copy locally; nothing is sent
    KeepServer(T),
    /// Send this version to the server
    Push(T),
}

impl<T: Clone> ConflictStrategy<T> {
    pub fn merge<F>(merge: F) -> Self
    where
        F: Fn(&T, &T) -> T + Send + Sync + 'static,
    {
        ConflictStrategy::Merge(Arc::new(merge))
    }

    /// Strategy for a configured selector; `Merge` needs `merge_fn`
    pub fn from_config(
        selector: ConflictResolution,
        merge_fn: Option<MergeFn<T>>,
    ) -> ConfigResult<Self> {
        match selector {
            ConflictResolution::ServerWins => Ok(ConflictStrategy::ServerWins),
            ConflictResolution::ClientWins => Ok(ConflictStrategy::ClientWins),
            ConflictResolution::Merge => merge_fn
                .map(ConflictStrategy::Merge)
                .ok_or(ConfigurationError::MissingMergeFunction),
        }
    }

    pub fn selector(&self) -> ConflictResolution {
        match self {
            ConflictStrategy::ServerWins => ConflictResolution::ServerWins,
            ConflictStrategy::ClientWins => ConflictResolution::ClientWins,
            ConflictStrategy::Merge(_) => ConflictResolution::Merge,
        }
    }

    pub fn resolve(&self, local: &T, server: &T) -> Resolution<T> {
        match self {
            ConflictStrategy::ServerWins => Resolution::KeepServer(server.clone()),
            ConflictStrategy::ClientWins => Resolution::Push(local.clone()),
            ConflictStrategy::Merge(merge) => Resolution::Push(merge(local, server)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind<T> {
    Create(T),
    Update {
        entity: T,
        /// Local copy the update was made against, if one existed
        base: Option<T>,
    },
    Delete {
        id: String,
    },
}

impl<T: Entity> MutationKind<T> {
    pub fn entity_id(&self) -> String {
        match self {
            MutationKind::Create(entity) => entity.id(),
            MutationKind::Update { entity, .. } => entity.id(),
            MutationKind::Delete { id } => id.clone(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create(_) => "create",
            MutationKind::Update { .. } => "update",
            MutationKind::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation<T> {
    pub mutation_id: Uuid,
    pub queued_at: DateTime<Utc>,
    pub kind: MutationKind<T>,
}

impl<T> PendingMutation<T> {
    pub fn new(kind: MutationKind<T>) -> Self {
        Self {
            mutation_id: Uuid::new_v4(),
            queued_at: Utc::now(),
            kind,
        }
    }
}

/// Summary of a sync pass that drained the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied: usize,
    pub conflicts_resolved: usize,
    /// Mutations queued while the pass was running
    pub remaining: usize,
}

/// Whether the server copy changed relative to `base`.
///
/// Revisions are compared when both sides carry one; otherwise the JSON
/// forms are. An unknown base always counts as diverged.
pub fn diverged<T: Entity>(base: Option<&T>, server: &T) -> bool {
    let Some(base) = base else {
        return true;
    };

    match (base.revision(), server.revision()) {
        (Some(a), Some(b)) => a != b,
        _ => serde_json::to_value(base).ok() != serde_json::to_value(server).ok(),
    }
}

/// What replaying one mutation did
struct Replayed<T> {
    conflict_resolved: bool,
    /// Server copy now carrying our write, when one exists
    stored: Option<T>,
}

impl<T> Replayed<T> {
    fn applied(stored: Option<T>) -> Self {
        Self {
            conflict_resolved: false,
            stored,
        }
    }

    fn resolved(stored: Option<T>) -> Self {
        Self {
            conflict_resolved: true,
            stored,
        }
    }
}

/// Point mutations queued after a replayed one at what the server now stores.
///
/// Later updates take `stored` as their conflict base and follow a
/// server-assigned id, as do later deletes. Rebasing stops at the next create
/// or delete of the same id.
fn rebase_queued<T: Entity>(
    pending: &mut VecDeque<PendingMutation<T>>,
    replayed_id: &str,
    stored: &T,
) {
    let stored_id = stored.id();
    for mutation in pending.iter_mut() {
        if mutation.kind.entity_id() != replayed_id {
            continue;
        }
        match &mut mutation.kind {
            MutationKind::Create(_) => break,
            MutationKind::Update { entity, base } => {
                if stored_id != replayed_id {
                    match entity.with_id(&stored_id) {
                        Ok(rekeyed) => *entity = rekeyed,
                        Err(failure) => {
                            warn!(
                                entity_type = T::entity_type(),
                                mutation_id = %mutation.mutation_id,
                                queued_id = %replayed_id,
                                server_id = %stored_id,
                                error = %failure,
                                "Queued update cannot follow server-assigned id"
                            );
                            continue;
                        }
                    }
                }
                *base = Some(stored.clone());
            }
            MutationKind::Delete { id } => {
                *id = stored_id;
                break;
            }
        }
    }
}

impl<T: Entity> TieredRepository<T> {
    /// Queue a create; the entity is stored locally right away
    pub async fn queue_create(&self, entity: T) -> Outcome<Uuid> {
        self.local.put(entity.clone()).await?;
        self.cache
            .set(&self.entity_key(&entity.id()), entity.clone(), self.cache_ttl);
        self.after_local_change().await;

        Ok(self.enqueue(MutationKind::Create(entity)))
    }

    /// Queue an update; the current local copy is kept as the conflict base.
    ///
    /// When an earlier queued mutation for the same id replays first, the base
    /// moves to the copy the server stored for it.
    pub async fn queue_update(&self, entity: T) -> Outcome<Uuid> {
        let base = self.local.get(&entity.id()).await?;
        self.local.put(entity.clone()).await?;
        self.cache
            .set(&self.entity_key(&entity.id()), entity.clone(), self.cache_ttl);
        self.after_local_change().await;

        Ok(self.enqueue(MutationKind::Update { entity, base }))
    }

    /// Queue a delete; the entity is removed locally right away
    pub async fn queue_delete(&self, id: &str) -> Outcome<Uuid> {
        self.local.delete(id).await?;
        self.cache.invalidate(&self.entity_key(id));
        self.after_local_change().await;

        Ok(self.enqueue(MutationKind::Delete { id: id.to_string() }))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn pending_mutations(&self) -> Vec<PendingMutation<T>> {
        self.pending.lock().iter().cloned().collect()
    }

    pub fn conflict_strategy(&self) -> &ConflictStrategy<T> {
        &self.conflict_strategy
    }

    fn enqueue(&self, kind: MutationKind<T>) -> Uuid {
        let mutation = PendingMutation::new(kind);
        let mutation_id = mutation.mutation_id;
        debug!(
            entity_type = T::entity_type(),
            mutation_id = %mutation_id,
            mutation = mutation.kind.as_str(),
            "Queued offline mutation"
        );
        self.pending.lock().push_back(mutation);
        mutation_id
    }

    /// Replay queued mutations in order until the queue is empty or one fails.
    ///
    /// Only one pass runs at a time; a second caller waits for the first.
    pub async fn sync(&self) -> Outcome<SyncReport> {
        let _pass = self.sync_lock.lock().await;
        let mut report = SyncReport::default();

        loop {
            let Some(mutation) = self.pending.lock().front().cloned() else {
                break;
            };

            match self.replay(&mutation.kind).await {
                Ok(replayed) => {
                    {
                        let mut pending = self.pending.lock();
                        if pending
                            .front()
                            .is_some_and(|front| front.mutation_id == mutation.mutation_id)
                        {
                            pending.pop_front();
                        }
                        if let Some(stored) = &replayed.stored {
                            rebase_queued(&mut pending, &mutation.kind.entity_id(), stored);
                        }
                    }
                    if let Some(stored) = &replayed.stored {
                        self.restore_queued_edit(&stored.id()).await;
                    }

                    report.applied += 1;
                    if replayed.conflict_resolved {
                        report.conflicts_resolved += 1;
                    }
                }
                Err(failure) => {
                    let remaining = self.pending_count();
                    warn!(
                        entity_type = T::entity_type(),
                        mutation_id = %mutation.mutation_id,
                        mutation = mutation.kind.as_str(),
                        entity_id = %mutation.kind.entity_id(),
                        applied = report.applied,
                        remaining = remaining,
                        failure_kind = %failure.kind(),
                        "🚨 Sync halted"
                    );
                    log_sync_operation(
                        T::entity_type(),
                        report.applied,
                        remaining,
                        "HALTED",
                        Some(failure.message()),
                    );
                    return Err(failure);
                }
            }
        }

        report.remaining = self.pending_count();
        info!(
            entity_type = T::entity_type(),
            applied = report.applied,
            conflicts_resolved = report.conflicts_resolved,
            "🟢 Sync complete"
        );
        log_sync_operation(
            T::entity_type(),
            report.applied,
            report.remaining,
            "COMPLETED",
            None,
        );
        Ok(report)
    }

    async fn replay(&self, kind: &MutationKind<T>) -> Outcome<Replayed<T>> {
        match kind {
            MutationKind::Create(entity) => self.replay_create(entity).await,
            MutationKind::Update { entity, base } => self.replay_update(entity, base.as_ref()).await,
            MutationKind::Delete { id } => {
                match self.remote.invoke(RequestDescriptor::delete(self.entity_path(id))).await {
                    Ok(_) => {}
                    // already gone upstream
                    Err(failure) if failure.is(FailureKind::NotFound) => {}
                    Err(failure) => return Err(failure),
                }
                self.invalidate_pages();
                Ok(Replayed::applied(None))
            }
        }
    }

    async fn replay_create(&self, entity: &T) -> Outcome<Replayed<T>> {
        let body = self.codec.to_wire(entity)?;
        let request = RequestDescriptor::post(self.resource_path.clone(), body);

        match self.remote.invoke(request).await {
            Ok(response) => {
                let created = self.codec.from_wire(&response)?;
                self.adopt(entity, created.clone()).await;
                Ok(Replayed::applied(Some(created)))
            }
            Err(failure) if failure.is(FailureKind::Conflict) => {
                let server = self.fetch_remote(&entity.id()).await?;
                let pushed = self.apply_resolution(entity, server).await?;
                Ok(Replayed::resolved(pushed))
            }
            Err(failure) => Err(failure),
        }
    }

    async fn replay_update(&self, entity: &T, base: Option<&T>) -> Outcome<Replayed<T>> {
        let server = match self.fetch_remote(&entity.id()).await {
            Ok(server) => server,
            Err(failure) if failure.is(FailureKind::NotFound) => {
                return self.replay_update_of_missing(entity).await;
            }
            Err(failure) => return Err(failure),
        };

        if !diverged(base, &server) {
            let updated = self.push_update(entity).await?;
            return Ok(Replayed::applied(Some(updated)));
        }

        debug!(
            entity_type = T::entity_type(),
            entity_id = %entity.id(),
            strategy = ?self.conflict_strategy.selector(),
            "🟡 Server copy diverged from queued update"
        );
        let pushed = self.apply_resolution(entity, server).await?;
        Ok(Replayed::resolved(pushed))
    }

    /// The server deleted the entity after the update was queued
    async fn replay_update_of_missing(&self, entity: &T) -> Outcome<Replayed<T>> {
        match self.conflict_strategy {
            ConflictStrategy::ServerWins => {
                self.remove_local(&entity.id()).await;
                Ok(Replayed::resolved(None))
            }
            ConflictStrategy::ClientWins | ConflictStrategy::Merge(_) => {
                let body = self.codec.to_wire(entity)?;
                let response = self
                    .remote
                    .invoke(RequestDescriptor::post(self.resource_path.clone(), body))
                    .await?;
                let created = self.codec.from_wire(&response)?;
                self.adopt(entity, created.clone()).await;
                Ok(Replayed::resolved(Some(created)))
            }
        }
    }

    /// Returns the pushed server copy, or `None` when the server copy was kept
    async fn apply_resolution(&self, local: &T, server: T) -> Outcome<Option<T>> {
        match self.conflict_strategy.resolve(local, &server) {
            Resolution::KeepServer(server) => {
                self.write_through(&server).await;
                self.after_local_change().await;
                Ok(None)
            }
            Resolution::Push(version) => Ok(Some(self.push_update(&version).await?)),
        }
    }

    async fn push_update(&self, entity: &T) -> Outcome<T> {
        let body = self.codec.to_wire(entity)?;
        let response = self
            .remote
            .invoke(RequestDescriptor::put(self.entity_path(&entity.id()), body))
            .await?;
        let updated = self.codec.from_wire(&response)?;
        self.write_through(&updated).await;
        self.after_local_change().await;
        Ok(updated)
    }

    /// Keep the newest queued edit for `id` visible locally after a replay
    /// wrote the server copy over it
    async fn restore_queued_edit(&self, id: &str) {
        let latest = self
            .pending
            .lock()
            .iter()
            .rev()
            .find(|mutation| mutation.kind.entity_id() == id)
            .map(|mutation| mutation.kind.clone());

        match latest {
            Some(MutationKind::Update { entity, .. }) => {
                self.write_through(&entity).await;
                self.after_local_change().await;
            }
            Some(MutationKind::Delete { .. }) => {
                self.remove_local(id).await;
                self.after_local_change().await;
            }
            Some(MutationKind::Create(_)) | None => {}
        }
    }

    /// Replace the locally queued copy with what the server stored
    async fn adopt(&self, queued: &T, stored: T) {
        let queued_id = queued.id();
        if stored.id() != queued_id {
            self.remove_local(&queued_id).await;
        }
        self.write_through(&stored).await;
        self.after_local_change().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        id: String,
        body: String,
        rev: Option<u64>,
    }

    impl Entity for Doc {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn entity_type() -> &'static str {
            "doc"
        }

        fn revision(&self) -> Option<u64> {
            self.rev
        }
    }

    fn doc(body: &str, rev: Option<u64>) -> Doc {
        Doc {
            id: "1".to_string(),
            body: body.to_string(),
            rev,
        }
    }

    #[test]
    fn test_strategies_resolve() {
        let local = doc("mine", Some(1));
        let server = doc("theirs", Some(2));

        assert_eq!(
            ConflictStrategy::ServerWins.resolve(&local, &server),
            Resolution::KeepServer(server.clone())
        );
        assert_eq!(
            ConflictStrategy::ClientWins.resolve(&local, &server),
            Resolution::Push(local.clone())
        );

        let merge = ConflictStrategy::merge(|local: &Doc, server: &Doc| Doc {
            body: format!("{}+{}", local.body, server.body),
            ..server.clone()
        });
        assert_eq!(
            merge.resolve(&local, &server),
            Resolution::Push(doc("mine+theirs", Some(2)))
        );
    }

    #[test]
    fn test_from_config_requires_merge_fn() {
        let missing = ConflictStrategy::<Doc>::from_config(ConflictResolution::Merge, None);
        assert!(matches!(
            missing,
            Err(ConfigurationError::MissingMergeFunction)
        ));

        let merge_fn: MergeFn<Doc> = Arc::new(|_, server| server.clone());
        let strategy =
            ConflictStrategy::from_config(ConflictResolution::Merge, Some(merge_fn)).unwrap();
        assert_eq!(strategy.selector(), ConflictResolution::Merge);

        let client = ConflictStrategy::<Doc>::from_config(ConflictResolution::ClientWins, None);
        assert_eq!(client.unwrap().selector(), ConflictResolution::ClientWins);
    }

    #[test]
    fn test_divergence_detection() {
        // revisions decide when both sides have one
        assert!(!diverged(Some(&doc("a", Some(3))), &doc("b", Some(3))));
        assert!(diverged(Some(&doc("a", Some(3))), &doc("a", Some(4))));

        // otherwise compare content
        assert!(!diverged(Some(&doc("a", None)), &doc("a", None)));
        assert!(diverged(Some(&doc("a", None)), &doc("b", None)));

        assert!(diverged(None, &doc("a", Some(1))));
    }

    #[test]
    fn test_rebase_follows_server_copy_until_next_create() {
        let mut pending: VecDeque<PendingMutation<Doc>> = VecDeque::from(vec![
            PendingMutation::new(MutationKind::Update {
                entity: Doc { id: "tmp".into(), ..doc("edit", None) },
                base: Some(Doc { id: "tmp".into(), ..doc("draft", None) }),
            }),
            PendingMutation::new(MutationKind::Update {
                entity: doc("other", None),
                base: None,
            }),
            PendingMutation::new(MutationKind::Delete { id: "tmp".into() }),
            PendingMutation::new(MutationKind::Update {
                entity: Doc { id: "tmp".into(), ..doc("after delete", None) },
                base: None,
            }),
        ]);
        let stored = Doc {
            id: "srv-9".into(),
            ..doc("draft", Some(1))
        };

        rebase_queued(&mut pending, "tmp", &stored);

        match &pending[0].kind {
            MutationKind::Update { entity, base } => {
                assert_eq!(entity.id, "srv-9");
                assert_eq!(entity.body, "edit");
                assert_eq!(base.as_ref(), Some(&stored));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pending[1].kind.entity_id(), "1");
        assert_eq!(pending[2].kind.entity_id(), "srv-9");
        // nothing past the delete moves
        assert_eq!(pending[3].kind.entity_id(), "tmp");
    }
}
