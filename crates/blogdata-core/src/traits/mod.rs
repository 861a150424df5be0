//! Core traits defined in `blogdata-core` and implemented by other crates.

pub mod entity;
pub mod store;

pub use entity::{Entity, Field, FieldTable, FieldValue, Relation};
pub use store::{Change, RecordPayload, Reference, Store, StoreSession, StoredRecord, UniqueKey};
