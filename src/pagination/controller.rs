//! Infinite-scroll pagination driven by a page source

use super::state::{PaginationState, PaginationStatus};
use crate::config::PaginationConfig;
use crate::outcome::Outcome;
use crate::repository::{Entity, ListQuery, Page, Repository};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Anything that can produce one page for a query
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, query: &ListQuery) -> Outcome<Page<T>>;
}

/// Pages read through a repository's `get_all`
pub struct RepositoryPageSource<T: Entity> {
    repository: Arc<dyn Repository<T>>,
}

impl<T: Entity> RepositoryPageSource<T> {
    pub fn new(repository: Arc<dyn Repository<T>>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<T: Entity> PageSource<T> for RepositoryPageSource<T> {
    async fn fetch_page(&self, query: &ListQuery) -> Outcome<Page<T>> {
        self.repository.get_all(query).await
    }
}

struct ControllerInner<T> {
    state: PaginationState<T>,
    /// Bumped whenever in-flight results must be discarded
    generation: u64,
}

/// Loads pages of a fixed query and accumulates them.
///
/// Operations take `&self`; the state lives behind a mutex that is never held
/// across a fetch. `load_initial`, `refresh` and `reset` supersede any load
/// still in flight: its result is dropped when it arrives.
pub struct PaginationController<T> {
    source: Arc<dyn PageSource<T>>,
    query: ListQuery,
    inner: Mutex<ControllerInner<T>>,
    updates: watch::Sender<PaginationState<T>>,
}

impl<T: Clone + Send + Sync + 'static> PaginationController<T> {
    /// Controller paging through `query` starting from page 1
    pub fn new(source: Arc<dyn PageSource<T>>, query: ListQuery) -> Self {
        let state = PaginationState::new(query.page_size);
        let (updates, _) = watch::channel(state.clone());

        Self {
            source,
            query: query.with_page(1),
            inner: Mutex::new(ControllerInner {
                state,
                generation: 0,
            }),
            updates,
        }
    }

    /// Unfiltered controller using the configured page size
    pub fn from_config(source: Arc<dyn PageSource<T>>, config: &PaginationConfig) -> Self {
        Self::new(source, ListQuery::first_page(config.page_size))
    }

    pub fn state(&self) -> PaginationState<T> {
        self.inner.lock().state.clone()
    }

    pub fn status(&self) -> PaginationStatus {
        self.inner.lock().state.status()
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.lock().state.items.clone()
    }

    pub fn has_more(&self) -> bool {
        self.inner.lock().state.has_more
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    /// Receiver that sees every state change
    pub fn subscribe(&self) -> watch::Receiver<PaginationState<T>> {
        self.updates.subscribe()
    }

    /// Load page 1, replacing whatever is held. No-op while an initial load runs.
    pub async fn load_initial(&self) {
        if let Some(generation) = self.begin_initial(false) {
            self.complete_initial(generation).await;
        }
    }

    /// Append the next page. No-op while loading or when nothing is left.
    pub async fn load_more(&self) {
        let (generation, next_page) = {
            let mut inner = self.inner.lock();
            let state = &inner.state;
            if state.is_loading || state.is_loading_more || !state.has_more {
                return;
            }
            let next_page = state.current_page + 1;
            inner.state.is_loading_more = true;
            self.publish(&inner.state);
            (inner.generation, next_page)
        };

        let result = self.source.fetch_page(&self.query.with_page(next_page)).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(page = next_page, "Discarding superseded page load");
            return;
        }

        let state = &mut inner.state;
        state.is_loading_more = false;
        match result {
            Ok(page) => {
                state.items.extend(page.items);
                state.current_page = next_page;
                state.total_items = page.total_items;
                state.error = None;
                state.derive_has_more();
            }
            Err(failure) => {
                debug!(page = next_page, failure_kind = %failure.kind(), "Page load failed");
                state.error = Some(failure);
            }
        }
        self.publish(&inner.state);
    }

    /// Drop held items and load page 1 again
    pub async fn refresh(&self) {
        if let Some(generation) = self.begin_initial(true) {
            self.complete_initial(generation).await;
        }
    }

    /// Return to the empty initial state; loads in flight are discarded
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = PaginationState::new(self.query.page_size);
        self.publish(&inner.state);
    }

    fn begin_initial(&self, refreshing: bool) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.state.is_loading {
            return None;
        }

        inner.generation += 1;
        let state = &mut inner.state;
        state.items.clear();
        state.current_page = 0;
        state.is_loading = true;
        state.is_loading_more = false;
        state.is_refreshing = refreshing;
        if refreshing {
            state.has_more = true;
        }
        self.publish(&inner.state);
        Some(inner.generation)
    }

    async fn complete_initial(&self, generation: u64) {
        let result = self.source.fetch_page(&self.query).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("Discarding superseded initial load");
            return;
        }

        let state = &mut inner.state;
        state.is_loading = false;
        state.is_refreshing = false;
        match result {
            Ok(page) => {
                state.items = page.items;
                state.current_page = 1;
                state.total_items = page.total_items;
                state.error = None;
                state.derive_has_more();
            }
            Err(failure) => {
                debug!(failure_kind = %failure.kind(), "Initial page load failed");
                state.items.clear();
                state.error = Some(failure);
            }
        }
        self.publish(&inner.state);
    }

    fn publish(&self, state: &PaginationState<T>) {
        self.updates.send_replace(state.clone());
    }
}
