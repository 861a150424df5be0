//! # blogdata-database
//!
//! Storage drivers (in-memory and PostgreSQL), connection and migration
//! management, the generic [`Repository`] and the [`UnitOfWork`] that ties
//! repositories to one atomic commit.

pub mod blocking;
pub mod connection;
pub mod migration;
pub mod repository;
pub mod store;
pub mod unit_of_work;

pub use blocking::{BlockingRepository, BlockingUnitOfWork};
pub use connection::{DatabasePool, PoolHealth};
pub use repository::Repository;
pub use store::{MemoryStore, PgStore, open_store};
pub use unit_of_work::{UnitOfWork, UnitOfWorkBuilder, UnitStatus};
