//! Process-local document store.
//!
//! Commits are applied to a copy of the tables and swapped in only when
//! every change and every reference checks out, so a failed commit leaves
//! nothing behind. Unique keys are checked change by change; references
//! are checked once against the final state.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use blogdata_core::error::AppError;
use blogdata_core::result::AppResult;
use blogdata_core::traits::store::{Change, RecordPayload, Store, StoreSession, StoredRecord};
use blogdata_core::types::id::EntityId;

type Table = BTreeMap<EntityId, RecordPayload>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Table>,
    last_id: i64,
}

/// In-memory [`Store`]. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records of `entity_type`.
    pub async fn len(&self, entity_type: &str) -> usize {
        self.state
            .read()
            .await
            .tables
            .get(entity_type)
            .map_or(0, BTreeMap::len)
    }

    /// Whether no records of any type are committed.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.tables.values().all(BTreeMap::is_empty)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn driver_name(&self) -> &str {
        "memory"
    }

    async fn open_session(&self) -> AppResult<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            state: Some(Arc::clone(&self.state)),
        }))
    }
}

struct MemorySession {
    state: Option<Arc<RwLock<MemoryState>>>,
}

impl MemorySession {
    fn state(&self) -> AppResult<&Arc<RwLock<MemoryState>>> {
        self.state
            .as_ref()
            .ok_or_else(|| AppError::disposed("Memory store session is closed"))
    }
}

fn to_record(payload: &RecordPayload) -> StoredRecord {
    StoredRecord {
        id: payload.id,
        body: payload.body.clone(),
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn load_all(&mut self, entity_type: &str) -> AppResult<Vec<StoredRecord>> {
        let state = self.state()?.read().await;
        Ok(state
            .tables
            .get(entity_type)
            .map(|t| t.values().map(to_record).collect())
            .unwrap_or_default())
    }

    async fn load_by_id(
        &mut self,
        entity_type: &str,
        id: EntityId,
    ) -> AppResult<Option<StoredRecord>> {
        let state = self.state()?.read().await;
        Ok(state
            .tables
            .get(entity_type)
            .and_then(|t| t.get(&id))
            .map(to_record))
    }

    async fn next_id(&mut self, _entity_type: &str) -> AppResult<EntityId> {
        let mut state = self.state()?.write().await;
        state.last_id += 1;
        Ok(EntityId(state.last_id))
    }

    async fn commit(&mut self, changes: &[Change]) -> AppResult<()> {
        let mut state = self.state()?.write().await;
        let mut tables = state.tables.clone();
        for change in changes {
            apply(&mut tables, change)
                .map_err(|e| e.in_operation(change.op_name()))?;
        }
        check_references(&tables).map_err(|e| e.in_operation("commit"))?;
        state.tables = tables;
        debug!(changes = changes.len(), "Memory store commit applied");
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.state = None;
        Ok(())
    }
}

fn missing(entity_type: &str, id: EntityId) -> AppError {
    AppError::not_found(format!("{entity_type} {id} does not exist"))
        .for_entity_type(entity_type)
        .for_entity(id)
}

fn apply(tables: &mut BTreeMap<String, Table>, change: &Change) -> AppResult<()> {
    match change {
        Change::Insert {
            entity_type,
            record,
        } => {
            let table = tables.entry(entity_type.clone()).or_default();
            if table.contains_key(&record.id) {
                return Err(AppError::constraint_violation(
                    entity_type,
                    record.id,
                    format!("{entity_type} {} already exists", record.id),
                ));
            }
            check_unique(table, entity_type, record)?;
            table.insert(record.id, record.clone());
        }
        Change::Update {
            entity_type,
            record,
        } => {
            let table = tables.entry(entity_type.clone()).or_default();
            if !table.contains_key(&record.id) {
                return Err(missing(entity_type, record.id));
            }
            check_unique(table, entity_type, record)?;
            table.insert(record.id, record.clone());
        }
        Change::Delete { entity_type, id } => {
            let removed = tables
                .get_mut(entity_type.as_str())
                .and_then(|t| t.remove(id));
            if removed.is_none() {
                return Err(missing(entity_type, *id));
            }
        }
    }
    Ok(())
}

fn check_unique(table: &Table, entity_type: &str, record: &RecordPayload) -> AppResult<()> {
    for key in &record.unique_keys {
        let taken = table
            .values()
            .find(|other| other.id != record.id && other.unique_keys.contains(key));
        if let Some(other) = taken {
            return Err(AppError::constraint_violation(
                entity_type,
                record.id,
                format!(
                    "{} '{}' is already used by {entity_type} {}",
                    key.name, key.value, other.id
                ),
            ));
        }
    }
    Ok(())
}

fn check_references(tables: &BTreeMap<String, Table>) -> AppResult<()> {
    for (entity_type, table) in tables {
        for record in table.values() {
            for reference in &record.references {
                let exists = tables
                    .get(&reference.entity_type)
                    .is_some_and(|t| t.contains_key(&reference.id));
                if !exists {
                    return Err(AppError::constraint_violation(
                        entity_type,
                        record.id,
                        format!(
                            "{entity_type} {} references missing {} {}",
                            record.id, reference.entity_type, reference.id
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}
