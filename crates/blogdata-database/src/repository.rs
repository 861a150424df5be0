//! Generic repository over one entity type.
//!
//! Reads go through the unit of work's session and see the unit's own
//! staged writes. Writes are only staged here; nothing reaches the store
//! before [`UnitOfWork::commit`](crate::UnitOfWork::commit).

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::MutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use blogdata_core::error::AppError;
use blogdata_core::query::{SearchQuery, Specification, search};
use blogdata_core::result::AppResult;
use blogdata_core::traits::entity::Entity;
use blogdata_core::traits::store::{Change, RecordPayload, StoredRecord};
use blogdata_core::types::id::EntityId;
use blogdata_core::types::pagination::PagedListResult;

use crate::unit_of_work::{SessionState, UnitContext};

/// Repository for entity type `T`, bound to one unit of work.
pub struct Repository<T: Entity> {
    ctx: Arc<UnitContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity_type", &T::TYPE_NAME)
            .field("uow_id", &self.ctx.id)
            .finish()
    }
}

fn decode<T: Entity>(record: StoredRecord) -> AppResult<T> {
    let id = record.id;
    let mut entity: T = serde_json::from_value(record.body)
        .map_err(|e| AppError::from(e).for_entity_type(T::TYPE_NAME).for_entity(id))?;
    entity.set_id(id);
    Ok(entity)
}

fn payload<T: Entity>(entity: &T) -> AppResult<RecordPayload> {
    let body = serde_json::to_value(entity).map_err(|e| {
        AppError::from(e)
            .for_entity_type(T::TYPE_NAME)
            .for_entity(entity.id())
    })?;
    Ok(RecordPayload {
        id: entity.id(),
        body,
        unique_keys: entity.unique_keys(),
        references: entity.references(),
    })
}

fn require_id<T: Entity>(entity: &T, operation: &str) -> AppResult<EntityId> {
    let id = entity.id();
    if !id.is_assigned() {
        return Err(AppError::configuration(format!(
            "Cannot {operation} a {} that has not been inserted",
            T::TYPE_NAME
        ))
        .for_entity_type(T::TYPE_NAME)
        .in_operation(operation));
    }
    Ok(id)
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(ctx: Arc<UnitContext>) -> Self {
        Self {
            ctx,
            _entity: PhantomData,
        }
    }

    async fn lock(&self) -> AppResult<MutexGuard<'_, SessionState>> {
        let disposed = || {
            AppError::disposed(format!(
                "Repository<{}> belongs to a disposed unit of work",
                T::TYPE_NAME
            ))
            .for_entity_type(T::TYPE_NAME)
        };
        if self.ctx.is_disposed() {
            return Err(disposed());
        }
        let state = self.ctx.state.lock().await;
        state.ensure_open().map_err(|_| disposed())?;
        Ok(state)
    }

    /// Load one entity by id. A missing id yields `None`.
    pub async fn get_by_id(&self, id: EntityId) -> AppResult<Option<T>> {
        let mut state = self.lock().await?;
        let record = state
            .load_by_id(T::TYPE_NAME, id)
            .await
            .map_err(|e| e.for_entity_type(T::TYPE_NAME))?;
        record.map(decode::<T>).transpose()
    }

    /// Load every entity, or those described by `spec`.
    ///
    /// With a specification: includes are loaded, then the filter, the
    /// ordering and the window are applied. Without one, rows come back in
    /// id order.
    pub async fn get_all(&self, spec: Option<&Specification<T>>) -> AppResult<Vec<T>> {
        let mut state = self.lock().await?;
        self.materialize(&mut state, spec)
            .await
            .map_err(|e| e.for_entity_type(T::TYPE_NAME))
    }

    /// [`get_all`](Self::get_all) that gives up when `token` is cancelled.
    ///
    /// Reads never stage anything, so an abandoned load leaves the unit of
    /// work as it was.
    pub async fn get_all_cancellable(
        &self,
        spec: Option<&Specification<T>>,
        token: &CancellationToken,
    ) -> AppResult<Vec<T>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, "Load cancelled");
                Err(AppError::cancelled(format!("Loading {} records was cancelled", T::TYPE_NAME))
                    .for_entity_type(T::TYPE_NAME)
                    .in_operation("get_all"))
            }
            rows = self.get_all(spec) => rows,
        }
    }

    async fn materialize(
        &self,
        state: &mut SessionState,
        spec: Option<&Specification<T>>,
    ) -> AppResult<Vec<T>> {
        let deadline = self.ctx.query_timeout;
        let mut rows = state
            .load_all(T::TYPE_NAME, deadline)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect::<AppResult<Vec<T>>>()?;

        let Some(spec) = spec else {
            debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, rows = rows.len(), "Loaded all");
            return Ok(rows);
        };

        for relation in spec.includes() {
            let related = state.load_all(relation.target, deadline).await?;
            for row in &mut rows {
                (relation.load)(row, &related)?;
            }
        }
        let loaded = rows.len();
        let rows = spec.evaluate(rows);
        debug!(
            uow_id = %self.ctx.id,
            entity_type = T::TYPE_NAME,
            includes = ?spec.include_names(),
            loaded,
            returned = rows.len(),
            "Evaluated specification"
        );
        Ok(rows)
    }

    /// Assign an id, stamp creation time and build the insert. On error the
    /// entity's id is left unassigned.
    async fn prepare_insert(&self, state: &mut SessionState, entity: &mut T) -> AppResult<Change> {
        if entity.id().is_assigned() {
            return Err(AppError::configuration(format!(
                "{} {} is already inserted",
                T::TYPE_NAME,
                entity.id()
            ))
            .for_entity_type(T::TYPE_NAME)
            .for_entity(entity.id())
            .in_operation("insert"));
        }
        let id = state.next_id(T::TYPE_NAME).await?;
        entity.set_id(id);
        entity.on_created(Utc::now());
        match payload(entity) {
            Ok(record) => Ok(Change::Insert {
                entity_type: T::TYPE_NAME.to_string(),
                record,
            }),
            Err(e) => {
                entity.set_id(EntityId::UNASSIGNED);
                Err(e)
            }
        }
    }

    fn prepare_update(entity: &mut T) -> AppResult<Change> {
        require_id(entity, "update")?;
        entity.on_modified(Utc::now());
        Ok(Change::Update {
            entity_type: T::TYPE_NAME.to_string(),
            record: payload(entity)?,
        })
    }

    fn prepare_delete(entity: &T) -> AppResult<Change> {
        Ok(Change::Delete {
            entity_type: T::TYPE_NAME.to_string(),
            id: require_id(entity, "delete")?,
        })
    }

    /// Assign an id to `entity`, stamp its creation time and stage it.
    pub async fn insert(&self, entity: &mut T) -> AppResult<()> {
        let mut state = self.lock().await?;
        let change = self.prepare_insert(&mut state, entity).await?;
        state.stage(change)?;
        debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, entity_id = %entity.id(), "Insert staged");
        Ok(())
    }

    /// Insert several entities in slice order.
    ///
    /// The batch is staged as a whole. If any entity fails, nothing is
    /// staged and every entity is restored to its state before the call.
    pub async fn insert_many(&self, entities: &mut [T]) -> AppResult<()> {
        if let Some(done) = entities.iter().find(|e| e.id().is_assigned()) {
            return Err(AppError::configuration(format!(
                "{} {} is already inserted",
                T::TYPE_NAME,
                done.id()
            ))
            .for_entity_type(T::TYPE_NAME)
            .in_operation("insert"));
        }
        let mut state = self.lock().await?;
        let originals = entities.to_vec();
        let staged: AppResult<()> = async {
            let mut changes = Vec::with_capacity(entities.len());
            for entity in entities.iter_mut() {
                changes.push(self.prepare_insert(&mut state, entity).await?);
            }
            state.stage_all(changes)
        }
        .await;
        if staged.is_err() {
            entities.clone_from_slice(&originals);
        } else {
            debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, count = entities.len(), "Inserts staged");
        }
        staged
    }

    /// Stamp the modification time of `entity` and stage a replacement.
    pub async fn update(&self, entity: &mut T) -> AppResult<()> {
        let mut state = self.lock().await?;
        let change = Self::prepare_update(entity)?;
        state.stage(change)?;
        debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, entity_id = %entity.id(), "Update staged");
        Ok(())
    }

    /// Update several entities in slice order, all or nothing like
    /// [`insert_many`](Self::insert_many).
    pub async fn update_many(&self, entities: &mut [T]) -> AppResult<()> {
        for entity in entities.iter() {
            require_id(entity, "update")?;
        }
        let mut state = self.lock().await?;
        let originals = entities.to_vec();
        let staged = entities
            .iter_mut()
            .map(Self::prepare_update)
            .collect::<AppResult<Vec<_>>>()
            .and_then(|changes| state.stage_all(changes));
        if staged.is_err() {
            entities.clone_from_slice(&originals);
        } else {
            debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, count = entities.len(), "Updates staged");
        }
        staged
    }

    /// Stage removal of `entity`.
    pub async fn delete(&self, entity: &T) -> AppResult<()> {
        let mut state = self.lock().await?;
        let change = Self::prepare_delete(entity)?;
        state.stage(change)?;
        debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, entity_id = %entity.id(), "Delete staged");
        Ok(())
    }

    /// Delete several entities in slice order; nothing is staged on error.
    pub async fn delete_many(&self, entities: &[T]) -> AppResult<()> {
        let changes = entities
            .iter()
            .map(Self::prepare_delete)
            .collect::<AppResult<Vec<_>>>()?;
        let mut state = self.lock().await?;
        state.stage_all(changes)?;
        debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, count = entities.len(), "Deletes staged");
        Ok(())
    }

    /// Mark `entity` deleted and stage the update. Entities without
    /// soft-delete markers are rejected.
    pub async fn soft_delete(&self, entity: &mut T) -> AppResult<()> {
        let id = require_id(entity, "soft_delete")?;
        if !entity.mark_deleted(Utc::now()) {
            return Err(AppError::configuration(format!(
                "{} does not support soft deletion",
                T::TYPE_NAME
            ))
            .for_entity_type(T::TYPE_NAME)
            .for_entity(id)
            .in_operation("soft_delete"));
        }
        let mut state = self.lock().await?;
        let record = payload(entity)?;
        state.stage(Change::Update {
            entity_type: T::TYPE_NAME.to_string(),
            record,
        })?;
        debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, entity_id = %id, "Soft delete staged");
        Ok(())
    }

    /// Whether any entity matches `spec`. The window is ignored.
    pub async fn any(&self, spec: &Specification<T>) -> AppResult<bool> {
        Ok(!self.get_all(Some(&spec.without_paging())).await?.is_empty())
    }

    /// Number of entities matching `spec`. The window is ignored.
    pub async fn count(&self, spec: &Specification<T>) -> AppResult<u64> {
        Ok(self.get_all(Some(&spec.without_paging())).await?.len() as u64)
    }

    /// The first entity `spec` yields, if any.
    pub async fn first_or_default(&self, spec: &Specification<T>) -> AppResult<Option<T>> {
        Ok(self.get_all(Some(spec)).await?.into_iter().next())
    }

    /// The last entity `spec` yields, if any.
    ///
    /// "Last" only means something under an ordering, so a specification
    /// without one is rejected before the store is read.
    pub async fn last_or_default(&self, spec: &Specification<T>) -> AppResult<Option<T>> {
        if spec.ordering().is_empty() {
            return Err(AppError::configuration(format!(
                "last_or_default on {} requires at least one ordering criterion",
                T::TYPE_NAME
            ))
            .for_entity_type(T::TYPE_NAME)
            .in_operation("last_or_default"));
        }
        Ok(self.get_all(Some(spec)).await?.pop())
    }

    /// Run `query` over the whole table.
    ///
    /// Includes that the query's ordering or search fields depend on are
    /// loaded automatically.
    pub async fn search(&self, query: &SearchQuery<T>) -> AppResult<PagedListResult<T>> {
        self.search_spec(&Specification::all(), query).await
    }

    /// Run `query` over the rows of `spec`. The spec's window is ignored;
    /// its ordering applies when the query has none.
    pub async fn search_spec(
        &self,
        spec: &Specification<T>,
        query: &SearchQuery<T>,
    ) -> AppResult<PagedListResult<T>> {
        let query = query.clone().or_ordering(spec.ordering());
        let base = spec.without_paging().with_includes(query.required_relations())?;
        let rows = self.get_all(Some(&base)).await?;
        Ok(search(rows, &query))
    }
}

#[cfg(test)]
mod tests {
    use blogdata_core::error::ErrorKind;
    use blogdata_core::types::sorting::{OrderingCriterion, SortDirection};
    use blogdata_entity::{Comment, Post, Tag, User};

    use super::*;
    use crate::UnitOfWork;
    use crate::store::MemoryStore;

    async fn begin(store: &MemoryStore) -> UnitOfWork {
        UnitOfWork::builder(Arc::new(store.clone()))
            .register::<User>()
            .register::<Post>()
            .register::<Comment>()
            .register::<Tag>()
            .begin()
            .await
            .unwrap()
    }

    async fn seed_author(uow: &UnitOfWork) -> User {
        let mut user = User::new("ann", "ann@example.com");
        uow.repository::<User>().unwrap().insert(&mut user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_round_trips() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let author = seed_author(&uow).await;
        let posts = uow.repository::<Post>().unwrap();

        let mut post = Post::new("Hello", "World", author.id);
        posts.insert(&mut post).await.unwrap();
        assert!(post.id.is_assigned());
        uow.commit().await.unwrap();

        let reader = begin(&store).await;
        let loaded = reader
            .repository::<Post>()
            .unwrap()
            .get_by_id(post.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, post);
        assert!(
            reader
                .repository::<Post>()
                .unwrap()
                .get_by_id(EntityId(9999))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_reads_see_staged_writes() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let tags = uow.repository::<Tag>().unwrap();

        let mut rust = Tag::new("rust");
        tags.insert(&mut rust).await.unwrap();
        assert_eq!(tags.get_all(None).await.unwrap().len(), 1);

        rust.name = "rustlang".into();
        tags.update(&mut rust).await.unwrap();
        let loaded = tags.get_by_id(rust.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "rustlang");

        tags.delete(&rust).await.unwrap();
        assert!(tags.get_by_id(rust.id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_twice_and_update_unsaved_are_rejected() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let tags = uow.repository::<Tag>().unwrap();

        let mut tag = Tag::new("rust");
        assert_eq!(
            tags.update(&mut tag).await.unwrap_err().kind,
            ErrorKind::Configuration
        );
        tags.insert(&mut tag).await.unwrap();
        assert_eq!(
            tags.insert(&mut tag).await.unwrap_err().kind,
            ErrorKind::Configuration
        );
    }

    #[tokio::test]
    async fn test_soft_delete_requires_markers() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let author = seed_author(&uow).await;

        let posts = uow.repository::<Post>().unwrap();
        let mut post = Post::new("Hello", "World", author.id);
        posts.insert(&mut post).await.unwrap();
        posts.soft_delete(&mut post).await.unwrap();
        let loaded = posts.get_by_id(post.id).await.unwrap().unwrap();
        assert!(loaded.is_deleted);
        assert!(loaded.deleted_on.is_some());

        let tags = uow.repository::<Tag>().unwrap();
        let mut tag = Tag::new("rust");
        tags.insert(&mut tag).await.unwrap();
        let err = tags.soft_delete(&mut tag).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_first_and_last_or_default() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let author = seed_author(&uow).await;
        let posts = uow.repository::<Post>().unwrap();
        let mut batch: Vec<Post> = ["B", "C", "A"]
            .into_iter()
            .map(|t| Post::new(t, "", author.id))
            .collect();
        posts.insert_many(&mut batch).await.unwrap();

        let by_title = Specification::<Post>::builder()
            .order_by("title", SortDirection::Ascending)
            .build()
            .unwrap();
        let first = posts.first_or_default(&by_title).await.unwrap().unwrap();
        let last = posts.last_or_default(&by_title).await.unwrap().unwrap();
        assert_eq!(first.title, "A");
        assert_eq!(last.title, "C");

        let err = posts
            .last_or_default(&Specification::all())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);

        let none = Specification::<Post>::filtered(|p| p.title == "Z");
        assert!(posts.first_or_default(&none).await.unwrap().is_none());
        assert!(!posts.any(&none).await.unwrap());
        assert_eq!(posts.count(&Specification::all()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_includes_are_loaded_before_filtering() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let author = seed_author(&uow).await;

        let mut post = Post::new("Hello", "World", author.id);
        uow.repository::<Post>().unwrap().insert(&mut post).await.unwrap();
        let comments = uow.repository::<Comment>().unwrap();
        let mut comment = Comment::new(post.id, author.id, "first!");
        comments.insert(&mut comment).await.unwrap();

        let spec = Specification::<Comment>::builder()
            .include("author")
            .filter(|c| c.author.as_ref().is_some_and(|u| u.username == "ann"))
            .build()
            .unwrap();
        let rows = comments.get_all(Some(&spec)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].author.as_ref().unwrap().email, "ann@example.com");
    }

    #[tokio::test]
    async fn test_search_spec_uses_spec_ordering() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let tags = uow.repository::<Tag>().unwrap();
        let mut batch: Vec<Tag> = ["go", "rust", "c", "zig"].into_iter().map(Tag::new).collect();
        tags.insert_many(&mut batch).await.unwrap();

        let spec = Specification::<Tag>::builder()
            .filter(|t| t.name != "go")
            .order_by("name", SortDirection::Descending)
            .window(0, 1)
            .build()
            .unwrap();
        let query = SearchQuery::new(0, 10).unwrap();
        let page = tags.search_spec(&spec, &query).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zig", "rust", "c"]);
        assert_eq!(page.total_items, 3);

        let query = SearchQuery::new(0, 10)
            .unwrap()
            .order_by(&[OrderingCriterion::asc("name")])
            .unwrap();
        let page = tags.search_spec(&spec, &query).await.unwrap();
        assert_eq!(page.items[0].name, "c");
    }

    #[tokio::test]
    async fn test_search_loads_includes_its_fields_depend_on() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let users = uow.repository::<User>().unwrap();
        let mut authors = vec![
            User::new("zoe", "zoe@example.com"),
            User::new("adam", "adam@example.com"),
        ];
        users.insert_many(&mut authors).await.unwrap();
        let mut post = Post::new("t", "c", authors[0].id);
        uow.repository::<Post>().unwrap().insert(&mut post).await.unwrap();
        let comments = uow.repository::<Comment>().unwrap();
        let mut batch = vec![
            Comment::new(post.id, authors[0].id, "first"),
            Comment::new(post.id, authors[1].id, "second"),
        ];
        comments.insert_many(&mut batch).await.unwrap();

        let by_author = SearchQuery::<Comment>::new(0, 10)
            .unwrap()
            .order_by(&[OrderingCriterion::asc("authorName")])
            .unwrap();
        let page = comments.search(&by_author).await.unwrap();
        let contents: Vec<&str> = page.items.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);

        let page = comments
            .search(&SearchQuery::new(0, 10).unwrap().search("ZOE"))
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].content, "first");

        let err = Specification::<Comment>::builder()
            .order_by("authorName", SortDirection::Ascending)
            .build()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_load() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let tags = uow.repository::<Tag>().unwrap();
        tags.insert(&mut Tag::new("rust")).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = tags.get_all_cancellable(None, &token).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(uow.pending_changes().await, 1);

        let live = CancellationToken::new();
        assert_eq!(tags.get_all_cancellable(None, &live).await.unwrap().len(), 1);
    }
}
