//! # blogdata-entity
//!
//! Blog entity models for BlogData. Every struct in this crate is stored as
//! a document by the data-access core and implements
//! [`blogdata_core::Entity`]: it declares its field table (for ordering and
//! search), its include relations, and the unique keys and references the
//! store enforces on commit.
//!
//! Navigation fields (`author`, `comments`, ...) are only populated when a
//! specification includes them and are never written to the store.

pub mod comment;
pub mod post;
mod relation;
pub mod tag;
pub mod user;

pub use comment::Comment;
pub use post::Post;
pub use tag::Tag;
pub use user::User;
