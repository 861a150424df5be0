//! Entity declarations: typed field tables and include relations.
//!
//! Sorting and searching by field name never uses reflection. Each entity
//! type registers a [`FieldTable`] of accessor functions once, and names
//! are resolved against that table (case-insensitively) when a query is
//! built.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::result::AppResult;
use crate::traits::store::{Reference, StoredRecord, UniqueKey};
use crate::types::id::EntityId;

/// A field value extracted from an entity for ordering or searching.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Missing value; sorts before everything else.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value, ordered with `total_cmp`.
    Float(f64),
    /// Text value, ordered by code point.
    Text(String),
    /// Timestamp value.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Text(_) => 4,
            Self::Timestamp(_) => 5,
        }
    }

    /// Natural ascending order. Values of different kinds order by kind.
    pub fn cmp_natural(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Return the text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Case-insensitive "contains" check. `needle` must already be lowercase.
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        match self {
            Self::Null => false,
            Self::Text(s) => s.to_lowercase().contains(needle),
            other => other.to_string().to_lowercase().contains(needle),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<EntityId> for FieldValue {
    fn from(v: EntityId) -> Self {
        Self::Int(v.0)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(v: Option<V>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Accessor function turning an entity into one of its field values.
pub type FieldAccessor<T> = fn(&T) -> FieldValue;

/// A named, typed accessor registered for an entity type.
pub struct Field<T> {
    /// Declared field name (display casing).
    pub name: &'static str,
    /// Value accessor.
    pub accessor: FieldAccessor<T>,
    /// Relation that must be loaded for the accessor to see real data.
    /// Without it the field reads as null.
    pub requires: Option<&'static str>,
}

impl<T> Field<T> {
    /// Read this field from an entity.
    pub fn get(&self, entity: &T) -> FieldValue {
        (self.accessor)(entity)
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// The table of sortable and searchable fields of one entity type.
///
/// Names are keyed in lowercase so `createdOn`, `CreatedOn` and
/// `createdon` all resolve to the same accessor.
pub struct FieldTable<T> {
    entity_type: &'static str,
    fields: Vec<Field<T>>,
    index: HashMap<String, usize>,
}

impl<T> FieldTable<T> {
    /// Start an empty table for `entity_type`.
    pub fn new(entity_type: &'static str) -> Self {
        Self {
            entity_type,
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a field. A later registration under the same name wins.
    pub fn field(self, name: &'static str, accessor: FieldAccessor<T>) -> Self {
        self.register(Field {
            name,
            accessor,
            requires: None,
        })
    }

    /// Register a field computed from the `relation` include.
    pub fn field_via(
        self,
        name: &'static str,
        relation: &'static str,
        accessor: FieldAccessor<T>,
    ) -> Self {
        self.register(Field {
            name,
            accessor,
            requires: Some(relation),
        })
    }

    fn register(mut self, field: Field<T>) -> Self {
        let key = field.name.to_lowercase();
        match self.index.get(&key) {
            Some(&pos) => self.fields[pos] = field,
            None => {
                self.index.insert(key, self.fields.len());
                self.fields.push(field);
            }
        }
        self
    }

    /// Look up a field by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Field<T>> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&pos| &self.fields[pos])
    }

    /// Look up a field by name, failing with `FieldNotFound`.
    pub fn resolve(&self, name: &str) -> AppResult<Field<T>> {
        self.get(name)
            .copied()
            .ok_or_else(|| AppError::field_not_found(self.entity_type, name))
    }

    /// Entity type this table belongs to.
    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    /// Declared field names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

/// Attaches related records of another entity type onto an entity.
pub type RelationLoader<T> = fn(&mut T, &[StoredRecord]) -> AppResult<()>;

/// An include hint target: a related collection or reference that can be
/// eagerly materialized onto an entity.
pub struct Relation<T> {
    /// Include name, matched case-insensitively.
    pub name: &'static str,
    /// Entity type whose records are loaded for this relation.
    pub target: &'static str,
    /// Attaches the matching records to one entity.
    pub load: RelationLoader<T>,
}

impl<T> Clone for Relation<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Relation<T> {}

impl<T> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}

/// Resolve an include name against an entity type's relations.
pub fn resolve_relation<T: Entity>(name: &str) -> AppResult<Relation<T>> {
    let wanted = name.trim();
    T::relations()
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| AppError::field_not_found(T::TYPE_NAME, name))
}

/// A record type managed by repositories.
///
/// Implementations declare everything the generic data-access core needs
/// to know about a type: its identity, its field table, its include
/// relations, which fields free-text search looks at, and the constraints
/// the store enforces on commit.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Stable type name, used as the store's collection key.
    const TYPE_NAME: &'static str;

    /// Current identifier ([`EntityId::UNASSIGNED`] before insert).
    fn id(&self) -> EntityId;

    /// Write the store-assigned identifier.
    fn set_id(&mut self, id: EntityId);

    /// Fields available for ordering and searching.
    fn fields() -> &'static FieldTable<Self>;

    /// Relations available as include hints.
    fn relations() -> &'static [Relation<Self>] {
        &[]
    }

    /// Field names matched by free-text search.
    fn searchable_fields() -> &'static [&'static str] {
        &[]
    }

    /// Values that must be unique within this entity type.
    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    /// Other entities this one refers to; they must exist on commit.
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    /// Called on insert, before the entity is staged.
    fn on_created(&mut self, _at: DateTime<Utc>) {}

    /// Called on update, before the entity is staged.
    fn on_modified(&mut self, _at: DateTime<Utc>) {}

    /// Set soft-delete markers. Returns `false` if the type has none.
    fn mark_deleted(&mut self, _at: DateTime<Utc>) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        name: String,
        score: Option<i64>,
    }

    fn table() -> FieldTable<Row> {
        FieldTable::<Row>::new("row")
            .field("Name", |r| r.name.clone().into())
            .field("score", |r| r.score.into())
    }

    #[test]
    fn test_resolve_case_insensitive() {
        let table = table();
        let row = Row {
            name: "alpha".into(),
            score: None,
        };
        assert_eq!(table.resolve("NAME").unwrap().get(&row), FieldValue::from("alpha"));
        assert_eq!(table.resolve(" score ").unwrap().get(&row), FieldValue::Null);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["Name", "score"]);
    }

    #[test]
    fn test_unknown_field() {
        let err = table().resolve("nmae").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::FieldNotFound);
        assert!(err.message.contains("nmae"));
    }

    #[test]
    fn test_natural_order() {
        assert_eq!(FieldValue::Null.cmp_natural(&FieldValue::Int(0)), Ordering::Less);
        assert_eq!(FieldValue::Int(2).cmp_natural(&FieldValue::Int(10)), Ordering::Less);
        assert_eq!(
            FieldValue::from("B").cmp_natural(&FieldValue::from("a")),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Float(f64::NAN).cmp_natural(&FieldValue::Float(1.0)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_contains_lowercase() {
        assert!(FieldValue::from("Hello World").contains_lowercase("world"));
        assert!(FieldValue::Int(5551234).contains_lowercase("123"));
        assert!(!FieldValue::Null.contains_lowercase(""));
    }
}
