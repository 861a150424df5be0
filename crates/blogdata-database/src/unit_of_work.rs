//! Unit of work: one store session, one repository per registered entity
//! type, one commit boundary.
//!
//! ```text
//! Active ──commit ok──▶ Committed ─┐
//!   │  └──commit err / rollback──▶ RolledBack ─┤
//!   └──────────────── dispose ─────────────────┴──▶ Disposed
//! ```
//!
//! A unit of work is request-scoped and used from one logical task at a
//! time. Nesting is not supported: every unit of work opens its own store
//! session, and repositories never move between units of work. Staged
//! writes stay in memory until [`UnitOfWork::commit`] hands them to the
//! driver in call order.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use blogdata_core::config::DatabaseConfig;
use blogdata_core::error::AppError;
use blogdata_core::result::AppResult;
use blogdata_core::traits::entity::Entity;
use blogdata_core::traits::store::{Change, Store, StoreSession, StoredRecord};
use blogdata_core::types::id::EntityId;

use crate::repository::Repository;

/// Lifecycle state of a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// Repositories may be requested and writes staged.
    Active,
    /// Staged writes were applied.
    Committed,
    /// Staged writes were discarded, by request or after a failed commit.
    RolledBack,
    /// The session was released.
    Disposed,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Session and staged writes, guarded by the unit's mutex.
pub(crate) struct SessionState {
    session: Option<Box<dyn StoreSession>>,
    status: UnitStatus,
    changes: Vec<Change>,
}

impl SessionState {
    pub(crate) fn ensure_open(&self) -> AppResult<()> {
        if self.status == UnitStatus::Disposed {
            return Err(AppError::disposed("Unit of work has been disposed"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> AppResult<()> {
        self.ensure_open()?;
        if self.status != UnitStatus::Active {
            return Err(AppError::configuration(format!(
                "Unit of work is already {}; start a new one for further changes",
                self.status
            )));
        }
        Ok(())
    }

    fn session_mut(&mut self) -> AppResult<&mut Box<dyn StoreSession>> {
        self.session
            .as_mut()
            .ok_or_else(|| AppError::disposed("Unit of work session has been released"))
    }

    /// Committed records of `entity_type` with this unit's staged writes
    /// laid over them, in id order.
    pub(crate) async fn load_all(
        &mut self,
        entity_type: &str,
        deadline: Option<Duration>,
    ) -> AppResult<Vec<StoredRecord>> {
        self.ensure_open()?;
        let session = self.session_mut()?;
        let committed = match deadline {
            Some(limit) => tokio::time::timeout(limit, session.load_all(entity_type))
                .await
                .map_err(|_| {
                    AppError::timeout(format!(
                        "Loading all {entity_type} records exceeded {}ms",
                        limit.as_millis()
                    ))
                    .for_entity_type(entity_type)
                    .in_operation("load_all")
                })??,
            None => session.load_all(entity_type).await?,
        };
        Ok(overlay(committed, &self.changes, entity_type))
    }

    pub(crate) async fn load_by_id(
        &mut self,
        entity_type: &str,
        id: EntityId,
    ) -> AppResult<Option<StoredRecord>> {
        self.ensure_open()?;
        let mut row = self.session_mut()?.load_by_id(entity_type, id).await?;
        for change in self
            .changes
            .iter()
            .filter(|c| c.entity_type() == entity_type && c.id() == id)
        {
            row = match change {
                Change::Insert { record, .. } | Change::Update { record, .. } => {
                    Some(StoredRecord {
                        id,
                        body: record.body.clone(),
                    })
                }
                Change::Delete { .. } => None,
            };
        }
        Ok(row)
    }

    pub(crate) async fn next_id(&mut self, entity_type: &str) -> AppResult<EntityId> {
        self.ensure_active()?;
        self.session_mut()?.next_id(entity_type).await
    }

    pub(crate) fn stage(&mut self, change: Change) -> AppResult<()> {
        self.ensure_active()?;
        self.changes.push(change);
        Ok(())
    }

    /// Stage a batch as a unit: either every change is queued or none is.
    pub(crate) fn stage_all(&mut self, changes: Vec<Change>) -> AppResult<()> {
        self.ensure_active()?;
        self.changes.extend(changes);
        Ok(())
    }
}

fn overlay(committed: Vec<StoredRecord>, changes: &[Change], entity_type: &str) -> Vec<StoredRecord> {
    let mut rows: BTreeMap<EntityId, serde_json::Value> =
        committed.into_iter().map(|r| (r.id, r.body)).collect();
    for change in changes.iter().filter(|c| c.entity_type() == entity_type) {
        match change {
            Change::Insert { record, .. } | Change::Update { record, .. } => {
                rows.insert(record.id, record.body.clone());
            }
            Change::Delete { id, .. } => {
                rows.remove(id);
            }
        }
    }
    rows.into_iter()
        .map(|(id, body)| StoredRecord { id, body })
        .collect()
}

/// State shared by a unit of work and the repositories it hands out.
pub(crate) struct UnitContext {
    pub(crate) id: Uuid,
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) state: Mutex<SessionState>,
    disposed: AtomicBool,
}

impl UnitContext {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

type RepositoryFactory = fn(Arc<UnitContext>) -> Arc<dyn Any + Send + Sync>;

#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    factory: RepositoryFactory,
}

fn new_repository<T: Entity>(ctx: Arc<UnitContext>) -> Arc<dyn Any + Send + Sync> {
    Arc::new(Repository::<T>::new(ctx))
}

/// Builder for [`UnitOfWork`]. Entity types must be registered up front.
pub struct UnitOfWorkBuilder {
    store: Arc<dyn Store>,
    registrations: HashMap<&'static str, Registration>,
    conflicts: Vec<&'static str>,
    query_timeout: Option<Duration>,
}

impl fmt::Debug for UnitOfWorkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkBuilder")
            .field("driver", &self.store.driver_name())
            .field("entity_types", &self.registrations.keys().collect::<Vec<_>>())
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl UnitOfWorkBuilder {
    fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            registrations: HashMap::new(),
            conflicts: Vec::new(),
            query_timeout: None,
        }
    }

    /// Make a repository for `T` available from the unit of work.
    pub fn register<T: Entity>(mut self) -> Self {
        let registration = Registration {
            type_id: TypeId::of::<T>(),
            factory: new_repository::<T>,
        };
        if let Some(existing) = self.registrations.insert(T::TYPE_NAME, registration) {
            if existing.type_id != registration.type_id {
                self.conflicts.push(T::TYPE_NAME);
            }
        }
        self
    }

    /// Bound full-table loads by `timeout`.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Apply `database.query_timeout_seconds`; `0` leaves loads unbounded.
    pub fn with_config(mut self, config: &DatabaseConfig) -> Self {
        self.query_timeout = (config.query_timeout_seconds > 0)
            .then(|| Duration::from_secs(config.query_timeout_seconds));
        self
    }

    /// Open a store session and start the unit of work.
    pub async fn begin(self) -> AppResult<UnitOfWork> {
        if let Some(name) = self.conflicts.first() {
            return Err(AppError::configuration(format!(
                "Entity type name '{name}' is registered by two different types"
            )));
        }
        let session = self.store.open_session().await?;
        let id = Uuid::new_v4();
        info!(
            uow_id = %id,
            driver = self.store.driver_name(),
            entity_types = self.registrations.len(),
            "Unit of work started"
        );
        let ctx = Arc::new(UnitContext {
            id,
            query_timeout: self.query_timeout,
            state: Mutex::new(SessionState {
                session: Some(session),
                status: UnitStatus::Active,
                changes: Vec::new(),
            }),
            disposed: AtomicBool::new(false),
        });
        Ok(UnitOfWork {
            ctx,
            registrations: self.registrations,
            repositories: StdMutex::new(HashMap::new()),
        })
    }
}

/// A transactional boundary over one store session.
pub struct UnitOfWork {
    ctx: Arc<UnitContext>,
    registrations: HashMap<&'static str, Registration>,
    repositories: StdMutex<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.ctx.id)
            .field("disposed", &self.ctx.is_disposed())
            .finish()
    }
}

impl UnitOfWork {
    /// Start configuring a unit of work over `store`.
    pub fn builder(store: Arc<dyn Store>) -> UnitOfWorkBuilder {
        UnitOfWorkBuilder::new(store)
    }

    /// Correlation id used in log fields.
    pub fn id(&self) -> Uuid {
        self.ctx.id
    }

    /// Current lifecycle state.
    pub async fn status(&self) -> UnitStatus {
        self.ctx.state.lock().await.status
    }

    /// Number of writes staged and not yet committed.
    pub async fn pending_changes(&self) -> usize {
        self.ctx.state.lock().await.changes.len()
    }

    /// The repository for `T`. Repeated calls return the same instance.
    pub fn repository<T: Entity>(&self) -> AppResult<Arc<Repository<T>>> {
        if self.ctx.is_disposed() {
            return Err(AppError::disposed("Unit of work has been disposed")
                .for_entity_type(T::TYPE_NAME));
        }
        let registration = self
            .registrations
            .get(T::TYPE_NAME)
            .filter(|r| r.type_id == TypeId::of::<T>())
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "No repository registered for entity type '{}'",
                    T::TYPE_NAME
                ))
            })?;

        let mut cache = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let repository = cache
            .entry(T::TYPE_NAME)
            .or_insert_with(|| {
                debug!(uow_id = %self.ctx.id, entity_type = T::TYPE_NAME, "Repository created");
                (registration.factory)(Arc::clone(&self.ctx))
            })
            .clone();

        repository.downcast::<Repository<T>>().map_err(|_| {
            AppError::configuration(format!(
                "Repository for '{}' has an unexpected type",
                T::TYPE_NAME
            ))
        })
    }

    /// Apply every staged write as one atomic driver commit.
    ///
    /// On failure nothing is applied, the unit moves to
    /// [`UnitStatus::RolledBack`] and the driver error is returned.
    pub async fn commit(&self) -> AppResult<()> {
        let mut state = self.ctx.state.lock().await;
        state.ensure_active()?;
        let changes = std::mem::take(&mut state.changes);
        let result = state.session_mut()?.commit(&changes).await;
        match result {
            Ok(()) => {
                state.status = UnitStatus::Committed;
                info!(uow_id = %self.ctx.id, changes = changes.len(), "Unit of work committed");
                Ok(())
            }
            Err(e) => {
                state.status = UnitStatus::RolledBack;
                warn!(
                    uow_id = %self.ctx.id,
                    changes = changes.len(),
                    error = %e,
                    "Unit of work commit failed, staged changes discarded"
                );
                Err(e)
            }
        }
    }

    /// Discard staged writes.
    pub async fn rollback(&self) -> AppResult<()> {
        let mut state = self.ctx.state.lock().await;
        state.ensure_open()?;
        match state.status {
            UnitStatus::Committed => Err(AppError::configuration(
                "Unit of work is already committed and cannot be rolled back",
            )),
            _ => {
                let discarded = std::mem::take(&mut state.changes).len();
                state.status = UnitStatus::RolledBack;
                warn!(uow_id = %self.ctx.id, discarded, "Unit of work rolled back");
                Ok(())
            }
        }
    }

    /// Release the store session. Safe to call more than once.
    pub async fn dispose(&self) -> AppResult<()> {
        let mut state = self.ctx.state.lock().await;
        if state.status == UnitStatus::Disposed {
            return Ok(());
        }
        self.ctx.disposed.store(true, Ordering::Release);
        if !state.changes.is_empty() {
            warn!(
                uow_id = %self.ctx.id,
                discarded = state.changes.len(),
                "Unit of work disposed with uncommitted changes"
            );
            state.changes.clear();
        }
        state.status = UnitStatus::Disposed;
        let closed = match state.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        };
        debug!(uow_id = %self.ctx.id, "Unit of work disposed");
        closed
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.ctx.is_disposed() {
            return;
        }
        self.ctx.disposed.store(true, Ordering::Release);
        if let Ok(mut state) = self.ctx.state.try_lock() {
            if !state.changes.is_empty() {
                warn!(
                    uow_id = %self.ctx.id,
                    discarded = state.changes.len(),
                    "Unit of work dropped with uncommitted changes"
                );
            }
            state.changes.clear();
            state.status = UnitStatus::Disposed;
            // Dropping the session releases its connection.
            state.session = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use blogdata_core::error::ErrorKind;
    use blogdata_entity::{Tag, User};

    use super::*;
    use crate::store::MemoryStore;

    async fn begin(store: &MemoryStore) -> UnitOfWork {
        UnitOfWork::builder(Arc::new(store.clone()))
            .register::<User>()
            .register::<Tag>()
            .begin()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_repository_is_cached_per_type() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let a = uow.repository::<User>().unwrap();
        let b = uow.repository::<User>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_unregistered_type_is_configuration_error() {
        let store = MemoryStore::new();
        let uow = UnitOfWork::builder(Arc::new(store))
            .register::<User>()
            .begin()
            .await
            .unwrap();
        let err = uow.repository::<Tag>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        assert_eq!(uow.status().await, UnitStatus::Active);

        let tags = uow.repository::<Tag>().unwrap();
        tags.insert(&mut Tag::new("rust")).await.unwrap();
        assert_eq!(uow.pending_changes().await, 1);
        uow.commit().await.unwrap();
        assert_eq!(uow.status().await, UnitStatus::Committed);
        assert_eq!(store.len("tag").await, 1);

        let err = uow.commit().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        let err = tags.insert(&mut Tag::new("db")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(uow.rollback().await.is_err());

        uow.dispose().await.unwrap();
        uow.dispose().await.unwrap();
        assert_eq!(uow.status().await, UnitStatus::Disposed);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let users = uow.repository::<User>().unwrap();
        users
            .insert(&mut User::new("ann", "ann@example.com"))
            .await
            .unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(uow.status().await, UnitStatus::RolledBack);
        assert_eq!(uow.pending_changes().await, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_commit_moves_to_rolled_back() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let users = uow.repository::<User>().unwrap();
        users
            .insert(&mut User::new("ann", "ann@example.com"))
            .await
            .unwrap();
        users
            .insert(&mut User::new("ANN", "other@example.com"))
            .await
            .unwrap();
        let err = uow.commit().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConstraintViolation);
        assert_eq!(uow.status().await, UnitStatus::RolledBack);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_disposed_unit_rejects_repositories() {
        let store = MemoryStore::new();
        let uow = begin(&store).await;
        let users = uow.repository::<User>().unwrap();
        uow.dispose().await.unwrap();

        assert_eq!(uow.repository::<User>().unwrap_err().kind, ErrorKind::Disposed);
        assert_eq!(users.get_all(None).await.unwrap_err().kind, ErrorKind::Disposed);
        assert_eq!(uow.commit().await.unwrap_err().kind, ErrorKind::Disposed);
    }

    #[tokio::test]
    async fn test_drop_discards_staged_writes() {
        let store = MemoryStore::new();
        {
            let uow = begin(&store).await;
            let tags = uow.repository::<Tag>().unwrap();
            tags.insert(&mut Tag::new("rust")).await.unwrap();
        }
        assert!(store.is_empty().await);
    }
}
