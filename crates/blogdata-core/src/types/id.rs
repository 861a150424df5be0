//! Store-assigned entity identifiers.
//!
//! Identity is handed out by the storage driver when an entity is inserted
//! and never changes afterwards. Before insertion an entity carries
//! [`EntityId::UNASSIGNED`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier of a stored entity within its entity type.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    /// Placeholder carried by entities that have not been inserted yet.
    pub const UNASSIGNED: EntityId = EntityId(0);

    /// Create an identifier from a raw key.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Return the raw key.
    pub fn value(self) -> i64 {
        self.0
    }

    /// Whether the store has assigned this identifier.
    pub fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<EntityId> for i64 {
    fn from(id: EntityId) -> i64 {
        id.0
    }
}
