//! # Pagination
//!
//! [`PaginationController`] drives infinite-scroll loading over a
//! [`PageSource`], usually a repository wrapped in [`RepositoryPageSource`].
//! `has_more` always comes from the totals of the last successful fetch.

pub mod controller;
pub mod state;

pub use controller::{PageSource, PaginationController, RepositoryPageSource};
pub use state::{PaginationState, PaginationStatus};
