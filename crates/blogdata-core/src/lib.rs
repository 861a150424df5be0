//! # blogdata-core
//!
//! Core crate for BlogData. Contains the entity and storage driver traits,
//! configuration schemas, typed identifiers, ordering/paging/search request
//! types, the dynamic ordering engine, specifications, the search/pagination
//! layer, and the unified error system.
//!
//! This crate has **no** internal dependencies on other BlogData crates.

pub mod config;
pub mod error;
pub mod query;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use query::{OrderedSequence, Specification};
pub use result::AppResult;
pub use traits::Entity;
