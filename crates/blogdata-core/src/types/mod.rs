//! Core type definitions used across the BlogData workspace.

pub mod filter;
pub mod id;
pub mod pagination;
pub mod sorting;

pub use filter::{SearchValue, SortParameters, TableFilter};
pub use id::EntityId;
pub use pagination::PagedListResult;
pub use sorting::{OrderingCriterion, SortDirection};
