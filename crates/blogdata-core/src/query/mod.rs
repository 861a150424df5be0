//! Query building blocks: the ordering engine, specifications, and the
//! search/pagination layer.

pub mod ordering;
pub mod search;
pub mod specification;

pub use ordering::{CompiledOrdering, OrderedSequence, SortKey, apply_ordering};
pub use search::{SearchQuery, search};
pub use specification::{Predicate, Specification, SpecificationBuilder, Window};
