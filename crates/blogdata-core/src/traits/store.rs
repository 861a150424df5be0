//! Storage driver boundary.
//!
//! The data-access core does not implement a storage engine. It talks to a
//! [`Store`] that hands out exclusive [`StoreSession`]s; a session loads
//! JSON documents per entity type, allocates identifiers, and applies a
//! list of staged [`Change`]s atomically. Implementations live in
//! `blogdata-database`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::id::EntityId;

/// A stored document and its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record identifier.
    pub id: EntityId,
    /// Serialized entity.
    pub body: serde_json::Value,
}

/// A value that must be unique among records of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    /// Constraint name, e.g. `"username"`.
    pub name: String,
    /// Normalized value.
    pub value: String,
}

impl UniqueKey {
    /// Create a unique key.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A reference from one record to a record of another entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced entity type.
    pub entity_type: String,
    /// Referenced record identifier.
    pub id: EntityId,
}

impl Reference {
    /// Create a reference.
    pub fn new(entity_type: impl Into<String>, id: EntityId) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

/// A document to write, with the constraints it participates in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Record identifier.
    pub id: EntityId,
    /// Serialized entity.
    pub body: serde_json::Value,
    /// Unique keys to enforce.
    pub unique_keys: Vec<UniqueKey>,
    /// References that must resolve.
    pub references: Vec<Reference>,
}

/// One staged write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    /// Insert a new record.
    Insert {
        /// Target entity type.
        entity_type: String,
        /// Record to insert.
        record: RecordPayload,
    },
    /// Replace an existing record.
    Update {
        /// Target entity type.
        entity_type: String,
        /// Replacement record.
        record: RecordPayload,
    },
    /// Remove an existing record.
    Delete {
        /// Target entity type.
        entity_type: String,
        /// Record to remove.
        id: EntityId,
    },
}

impl Change {
    /// Entity type this change targets.
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Insert { entity_type, .. }
            | Self::Update { entity_type, .. }
            | Self::Delete { entity_type, .. } => entity_type,
        }
    }

    /// Identifier of the record this change targets.
    pub fn id(&self) -> EntityId {
        match self {
            Self::Insert { record, .. } | Self::Update { record, .. } => record.id,
            Self::Delete { id, .. } => *id,
        }
    }

    /// Short operation name for logs and error context.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// A storage backend that opens sessions.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug + 'static {
    /// Driver name for logs, e.g. `"memory"` or `"postgres"`.
    fn driver_name(&self) -> &str;

    /// Open a new session. The session is owned exclusively by its caller.
    async fn open_session(&self) -> AppResult<Box<dyn StoreSession>>;
}

/// An exclusive session against a [`Store`].
#[async_trait]
pub trait StoreSession: Send {
    /// Load every record of `entity_type`, in ascending id order.
    async fn load_all(&mut self, entity_type: &str) -> AppResult<Vec<StoredRecord>>;

    /// Load one record by id.
    async fn load_by_id(
        &mut self,
        entity_type: &str,
        id: EntityId,
    ) -> AppResult<Option<StoredRecord>>;

    /// Allocate a new identifier for `entity_type`. Identifiers are never
    /// reused, even when the insert that took one is rolled back.
    async fn next_id(&mut self, entity_type: &str) -> AppResult<EntityId>;

    /// Apply `changes` in order as one atomic operation. On error nothing
    /// is applied.
    async fn commit(&mut self, changes: &[Change]) -> AppResult<()>;

    /// Release the session's resources. Further calls are invalid.
    async fn close(&mut self) -> AppResult<()>;
}
