//! User domain entities.

pub mod model;
pub mod specifications;

pub use model::User;
