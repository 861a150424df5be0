//! Storage drivers behind the [`Store`] boundary.
//!
//! Two drivers ship with the crate: [`MemoryStore`] for tests and local
//! tooling, and [`PgStore`] which keeps documents in PostgreSQL.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use tracing::info;

use blogdata_core::config::{DatabaseConfig, StoreDriver};
use blogdata_core::result::AppResult;
use blogdata_core::traits::store::Store;

use crate::connection::DatabasePool;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

/// Open the store selected by `config.driver`.
///
/// The PostgreSQL driver connects a new pool; migrations are not run here.
pub async fn open_store(config: &DatabaseConfig) -> AppResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.driver {
        StoreDriver::Memory => Arc::new(MemoryStore::new()),
        StoreDriver::Postgres => {
            let db = DatabasePool::connect(config).await?;
            Arc::new(PgStore::from_database(&db))
        }
    };
    info!(driver = store.driver_name(), "Document store opened");
    Ok(store)
}
