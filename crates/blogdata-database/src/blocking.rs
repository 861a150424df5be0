//! Synchronous facade over [`UnitOfWork`] and [`Repository`].
//!
//! Each [`BlockingUnitOfWork`] owns a current-thread tokio runtime and
//! drives the async operations to completion on it. Do not use it from
//! inside an async context; the runtime refuses to nest.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use blogdata_core::error::{AppError, ErrorKind};
use blogdata_core::query::{SearchQuery, Specification};
use blogdata_core::result::AppResult;
use blogdata_core::traits::entity::Entity;
use blogdata_core::types::id::EntityId;
use blogdata_core::types::pagination::PagedListResult;

use crate::repository::Repository;
use crate::unit_of_work::{UnitOfWork, UnitOfWorkBuilder, UnitStatus};

/// A [`UnitOfWork`] for synchronous callers.
#[derive(Debug)]
pub struct BlockingUnitOfWork {
    // Dropped before the runtime it was created on.
    inner: UnitOfWork,
    runtime: Runtime,
}

impl BlockingUnitOfWork {
    /// Build a runtime and begin the unit of work on it.
    pub fn begin(builder: UnitOfWorkBuilder) -> AppResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to start blocking runtime", e)
            })?;
        let inner = runtime.block_on(builder.begin())?;
        Ok(Self { inner, runtime })
    }

    /// The repository for `T`.
    pub fn repository<T: Entity>(&self) -> AppResult<BlockingRepository<'_, T>> {
        Ok(BlockingRepository {
            runtime: &self.runtime,
            inner: self.inner.repository::<T>()?,
        })
    }

    /// Current lifecycle state.
    pub fn status(&self) -> UnitStatus {
        self.runtime.block_on(self.inner.status())
    }

    /// See [`UnitOfWork::commit`].
    pub fn commit(&self) -> AppResult<()> {
        self.runtime.block_on(self.inner.commit())
    }

    /// See [`UnitOfWork::rollback`].
    pub fn rollback(&self) -> AppResult<()> {
        self.runtime.block_on(self.inner.rollback())
    }

    /// See [`UnitOfWork::dispose`].
    pub fn dispose(&self) -> AppResult<()> {
        self.runtime.block_on(self.inner.dispose())
    }
}

/// A [`Repository`] for synchronous callers.
#[derive(Debug)]
pub struct BlockingRepository<'a, T: Entity> {
    runtime: &'a Runtime,
    inner: Arc<Repository<T>>,
}

impl<T: Entity> BlockingRepository<'_, T> {
    /// See [`Repository::get_by_id`].
    pub fn get_by_id(&self, id: EntityId) -> AppResult<Option<T>> {
        self.runtime.block_on(self.inner.get_by_id(id))
    }

    /// See [`Repository::get_all`].
    pub fn get_all(&self, spec: Option<&Specification<T>>) -> AppResult<Vec<T>> {
        self.runtime.block_on(self.inner.get_all(spec))
    }

    /// See [`Repository::insert`].
    pub fn insert(&self, entity: &mut T) -> AppResult<()> {
        self.runtime.block_on(self.inner.insert(entity))
    }

    /// See [`Repository::insert_many`].
    pub fn insert_many(&self, entities: &mut [T]) -> AppResult<()> {
        self.runtime.block_on(self.inner.insert_many(entities))
    }

    /// See [`Repository::update`].
    pub fn update(&self, entity: &mut T) -> AppResult<()> {
        self.runtime.block_on(self.inner.update(entity))
    }

    /// See [`Repository::delete`].
    pub fn delete(&self, entity: &T) -> AppResult<()> {
        self.runtime.block_on(self.inner.delete(entity))
    }

    /// See [`Repository::soft_delete`].
    pub fn soft_delete(&self, entity: &mut T) -> AppResult<()> {
        self.runtime.block_on(self.inner.soft_delete(entity))
    }

    /// See [`Repository::any`].
    pub fn any(&self, spec: &Specification<T>) -> AppResult<bool> {
        self.runtime.block_on(self.inner.any(spec))
    }

    /// See [`Repository::count`].
    pub fn count(&self, spec: &Specification<T>) -> AppResult<u64> {
        self.runtime.block_on(self.inner.count(spec))
    }

    /// See [`Repository::first_or_default`].
    pub fn first_or_default(&self, spec: &Specification<T>) -> AppResult<Option<T>> {
        self.runtime.block_on(self.inner.first_or_default(spec))
    }

    /// See [`Repository::last_or_default`].
    pub fn last_or_default(&self, spec: &Specification<T>) -> AppResult<Option<T>> {
        self.runtime.block_on(self.inner.last_or_default(spec))
    }

    /// See [`Repository::search`].
    pub fn search(&self, query: &SearchQuery<T>) -> AppResult<PagedListResult<T>> {
        self.runtime.block_on(self.inner.search(query))
    }
}

#[cfg(test)]
mod tests {
    use blogdata_core::types::sorting::SortDirection;
    use blogdata_entity::Tag;

    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_blocking_round_trip() {
        let store = MemoryStore::new();
        let uow = BlockingUnitOfWork::begin(
            UnitOfWork::builder(Arc::new(store.clone())).register::<Tag>(),
        )
        .unwrap();
        let tags = uow.repository::<Tag>().unwrap();
        let mut batch: Vec<Tag> = ["b", "a"].into_iter().map(Tag::new).collect();
        tags.insert_many(&mut batch).unwrap();
        uow.commit().unwrap();
        assert_eq!(uow.status(), UnitStatus::Committed);

        let spec = Specification::<Tag>::builder()
            .order_by("name", SortDirection::Ascending)
            .build()
            .unwrap();
        let first = tags.first_or_default(&spec).unwrap().unwrap();
        assert_eq!(first.name, "a");
        uow.dispose().unwrap();
        assert_eq!(tags.count(&spec).unwrap_err().kind, ErrorKind::Disposed);
    }
}
