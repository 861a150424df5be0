//! Post domain entities.

pub mod model;
pub mod specifications;

pub use model::Post;
