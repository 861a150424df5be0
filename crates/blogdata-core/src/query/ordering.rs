//! Dynamic ordering engine.
//!
//! Turns `(field name, direction)` pairs into a composite comparator over
//! an entity type. Names are resolved against [`Entity::fields`] when the
//! ordering is compiled, so a misspelled field fails before any data is
//! read. Sorting is stable: rows equal under every key keep their source
//! order, which keeps repeated paged queries reproducible.

use std::cmp::Ordering;
use std::fmt;

use crate::error::AppError;
use crate::result::AppResult;
use crate::traits::entity::{Entity, Field, FieldValue};
use crate::types::sorting::{OrderingCriterion, SortDirection};

/// One resolved sort key.
pub struct SortKey<T> {
    field: Field<T>,
    direction: SortDirection,
}

impl<T> SortKey<T> {
    /// Declared name of the field this key reads.
    pub fn field_name(&self) -> &'static str {
        self.field.name
    }

    /// Direction of this key.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Include the field depends on, if any.
    pub fn requires(&self) -> Option<&'static str> {
        self.field.requires
    }
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            direction: self.direction,
        }
    }
}

impl<T> fmt::Debug for SortKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.name, self.direction)
    }
}

/// A multi-key ordering with every field already resolved.
///
/// The first key is the primary sort; each later key only separates rows
/// that compare equal under all keys before it.
pub struct CompiledOrdering<T> {
    keys: Vec<SortKey<T>>,
}

impl<T> Clone for CompiledOrdering<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<T> fmt::Debug for CompiledOrdering<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.keys).finish()
    }
}

impl<T> Default for CompiledOrdering<T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<T: Entity> CompiledOrdering<T> {
    /// Resolve every criterion against `T`'s field table.
    pub fn compile(criteria: &[OrderingCriterion]) -> AppResult<Self> {
        let table = T::fields();
        let keys = criteria
            .iter()
            .map(|c| {
                Ok(SortKey {
                    field: table.resolve(&c.field)?,
                    direction: c.direction,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    /// Ordering by identifier, ascending. Used when a caller supplies no
    /// ordering but needs a deterministic one.
    pub fn by_identity() -> Self {
        Self {
            keys: vec![SortKey {
                field: Field {
                    name: "id",
                    accessor: |e: &T| FieldValue::from(e.id()),
                    requires: None,
                },
                direction: SortDirection::Ascending,
            }],
        }
    }

    /// Replace the chain with a single primary key.
    pub fn primary(&mut self, field: &str, direction: SortDirection) -> AppResult<()> {
        let field = T::fields().resolve(field)?;
        self.keys.clear();
        self.keys.push(SortKey { field, direction });
        Ok(())
    }

    /// Append a secondary key that refines ties of the existing chain.
    pub fn secondary(&mut self, field: &str, direction: SortDirection) -> AppResult<()> {
        if self.keys.is_empty() {
            return Err(AppError::configuration(format!(
                "Secondary ordering on '{field}' requires a primary ordering first"
            )));
        }
        let field = T::fields().resolve(field)?;
        self.keys.push(SortKey { field, direction });
        Ok(())
    }
}

impl<T> CompiledOrdering<T> {
    /// Whether no keys are set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of keys in the chain.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// The resolved keys, primary first.
    pub fn keys(&self) -> &[SortKey<T>] {
        &self.keys
    }

    /// The chain as criteria, using declared field names.
    pub fn criteria(&self) -> Vec<OrderingCriterion> {
        self.keys
            .iter()
            .map(|k| OrderingCriterion::new(k.field.name, k.direction))
            .collect()
    }

    fn extract(&self, entity: &T) -> Vec<FieldValue> {
        self.keys.iter().map(|k| k.field.get(entity)).collect()
    }

    fn compare_extracted(&self, a: &[FieldValue], b: &[FieldValue]) -> Ordering {
        for ((key, av), bv) in self.keys.iter().zip(a).zip(b) {
            let ord = av.cmp_natural(bv);
            let ord = if key.direction.is_descending() {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two entities under the full chain.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.compare_extracted(&self.extract(a), &self.extract(b))
    }

    /// Stable-sort `items` under the chain. An empty chain leaves the
    /// input order untouched.
    pub fn sort(&self, items: Vec<T>) -> Vec<T> {
        if self.keys.is_empty() || items.len() < 2 {
            return items;
        }
        let mut decorated: Vec<(Vec<FieldValue>, T)> =
            items.into_iter().map(|e| (self.extract(&e), e)).collect();
        decorated.sort_by(|(ka, _), (kb, _)| self.compare_extracted(ka, kb));
        decorated.into_iter().map(|(_, e)| e).collect()
    }
}

/// A sequence with an ordering chain attached but not yet applied.
///
/// Keys accumulate through [`apply_ordering`]; the sort itself runs once,
/// in [`OrderedSequence::into_vec`].
#[derive(Debug)]
pub struct OrderedSequence<T> {
    items: Vec<T>,
    ordering: CompiledOrdering<T>,
}

impl<T: Entity> OrderedSequence<T> {
    /// Wrap an unordered sequence.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            ordering: CompiledOrdering::default(),
        }
    }

    /// Wrap a sequence with a precompiled ordering.
    pub fn with_ordering(items: impl IntoIterator<Item = T>, ordering: CompiledOrdering<T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            ordering,
        }
    }

    /// Set the primary key, discarding any earlier chain.
    pub fn order_by(self, field: &str, direction: SortDirection) -> AppResult<Self> {
        apply_ordering(self, field, direction.is_descending(), false)
    }

    /// Append a secondary key.
    pub fn then_by(self, field: &str, direction: SortDirection) -> AppResult<Self> {
        apply_ordering(self, field, direction.is_descending(), true)
    }

    /// The ordering accumulated so far.
    pub fn ordering(&self) -> &CompiledOrdering<T> {
        &self.ordering
    }

    /// Sort and return the items.
    pub fn into_vec(self) -> Vec<T> {
        self.ordering.sort(self.items)
    }
}

/// Add one ordering key to a sequence.
///
/// `is_subsequent_key == false` establishes the primary key; `true` refines
/// ties of the keys already present. Fails with `FieldNotFound` when the
/// name does not resolve on `T`.
pub fn apply_ordering<T: Entity>(
    mut sequence: OrderedSequence<T>,
    field_name: &str,
    descending: bool,
    is_subsequent_key: bool,
) -> AppResult<OrderedSequence<T>> {
    let direction = if descending {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    if is_subsequent_key {
        sequence.ordering.secondary(field_name, direction)?;
    } else {
        sequence.ordering.primary(field_name, direction)?;
    }
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::ErrorKind;
    use crate::traits::entity::FieldTable;
    use crate::types::id::EntityId;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Track {
        id: EntityId,
        album: String,
        number: i64,
        rating: Option<i64>,
    }

    static TRACK_FIELDS: LazyLock<FieldTable<Track>> = LazyLock::new(|| {
        FieldTable::<Track>::new("track")
            .field("id", |t| t.id.into())
            .field("album", |t| t.album.clone().into())
            .field("number", |t| t.number.into())
            .field("rating", |t| t.rating.into())
    });

    impl Entity for Track {
        const TYPE_NAME: &'static str = "track";

        fn id(&self) -> EntityId {
            self.id
        }

        fn set_id(&mut self, id: EntityId) {
            self.id = id;
        }

        fn fields() -> &'static FieldTable<Self> {
            &TRACK_FIELDS
        }
    }

    fn track(id: i64, album: &str, number: i64, rating: Option<i64>) -> Track {
        Track {
            id: EntityId(id),
            album: album.into(),
            number,
            rating,
        }
    }

    fn tracks() -> Vec<Track> {
        vec![
            track(1, "b", 2, Some(5)),
            track(2, "a", 2, None),
            track(3, "b", 1, Some(3)),
            track(4, "a", 1, Some(5)),
            track(5, "a", 1, Some(4)),
        ]
    }

    fn ids(items: &[Track]) -> Vec<i64> {
        items.iter().map(|t| t.id.0).collect()
    }

    #[test]
    fn test_primary_then_secondary() {
        let sorted = OrderedSequence::new(tracks())
            .order_by("Album", SortDirection::Ascending)
            .unwrap()
            .then_by("NUMBER", SortDirection::Descending)
            .unwrap()
            .into_vec();
        assert_eq!(ids(&sorted), vec![2, 4, 5, 1, 3]);
    }

    #[test]
    fn test_ties_keep_source_order() {
        let sorted = OrderedSequence::new(tracks())
            .order_by("number", SortDirection::Ascending)
            .unwrap()
            .into_vec();
        assert_eq!(ids(&sorted), vec![3, 4, 5, 1, 2]);
    }

    #[test]
    fn test_reversing_one_key_reverses_only_that_key() {
        let asc = OrderedSequence::new(tracks())
            .order_by("album", SortDirection::Ascending)
            .unwrap()
            .then_by("number", SortDirection::Ascending)
            .unwrap()
            .into_vec();
        let desc = OrderedSequence::new(tracks())
            .order_by("album", SortDirection::Ascending)
            .unwrap()
            .then_by("number", SortDirection::Descending)
            .unwrap()
            .into_vec();
        assert_eq!(ids(&asc), vec![4, 5, 2, 3, 1]);
        assert_eq!(ids(&desc), vec![2, 4, 5, 1, 3]);
    }

    #[test]
    fn test_nulls_first_ascending() {
        let sorted = OrderedSequence::new(tracks())
            .order_by("rating", SortDirection::Ascending)
            .unwrap()
            .into_vec();
        assert_eq!(ids(&sorted), vec![2, 3, 5, 1, 4]);
    }

    #[test]
    fn test_primary_replaces_chain() {
        let seq = apply_ordering(OrderedSequence::new(tracks()), "album", false, false).unwrap();
        let seq = apply_ordering(seq, "number", false, true).unwrap();
        let seq = apply_ordering(seq, "rating", true, false).unwrap();
        assert_eq!(seq.ordering().len(), 1);
        assert_eq!(seq.ordering().criteria(), vec![OrderingCriterion::desc("rating")]);
    }

    #[test]
    fn test_unknown_field_fails() {
        let err = OrderedSequence::new(tracks())
            .order_by("albun", SortDirection::Ascending)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldNotFound);

        let err = CompiledOrdering::<Track>::compile(&[
            OrderingCriterion::asc("album"),
            OrderingCriterion::asc("nope"),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldNotFound);
    }

    #[test]
    fn test_secondary_without_primary() {
        let err = apply_ordering(OrderedSequence::new(tracks()), "album", false, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_by_identity() {
        let mut items = tracks();
        items.reverse();
        let sorted = CompiledOrdering::<Track>::by_identity().sort(items);
        assert_eq!(ids(&sorted), vec![1, 2, 3, 4, 5]);
    }
}
