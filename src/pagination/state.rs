//! Pagination state snapshot and its derived status

use crate::error::Failure;
use serde::Serialize;

/// Coarse status derived from the flags of a [`PaginationState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStatus {
    Idle,
    LoadingInitial,
    LoadingMore,
    Refreshing,
    Error,
}

/// Accumulated items plus the paging counters from the last successful fetch.
///
/// `current_page` is 0 until a first page has loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationState<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub is_refreshing: bool,
    pub has_more: bool,
    pub error: Option<Failure>,
}

impl<T> PaginationState<T> {
    pub fn new(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            current_page: 0,
            page_size: page_size.max(1),
            total_items: 0,
            is_loading: false,
            is_loading_more: false,
            is_refreshing: false,
            has_more: true,
            error: None,
        }
    }

    /// `ceil(total_items / page_size)`
    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(self.page_size.max(1) as u64)
    }

    /// Recompute `has_more` from the counters
    pub(crate) fn derive_has_more(&mut self) {
        self.has_more = (self.current_page as u64) < self.total_pages();
    }

    pub fn status(&self) -> PaginationStatus {
        if self.is_loading && self.is_refreshing {
            PaginationStatus::Refreshing
        } else if self.is_loading {
            PaginationStatus::LoadingInitial
        } else if self.is_loading_more {
            PaginationStatus::LoadingMore
        } else if self.error.is_some() {
            PaginationStatus::Error
        } else {
            PaginationStatus::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_loading_more
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
