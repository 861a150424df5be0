//! Specifications: "which rows, with what related data, in what order,
//! optionally windowed" for one entity type.
//!
//! A specification is plain data composed by construction. Orderings and
//! include names are resolved in [`SpecificationBuilder::build`], so an
//! invalid name fails before any query runs.

use std::fmt;
use std::sync::Arc;

use crate::error::AppError;
use crate::query::ordering::CompiledOrdering;
use crate::result::AppResult;
use crate::traits::entity::{Entity, Relation, resolve_relation};
use crate::types::sorting::{OrderingCriterion, SortDirection};

/// Filter predicate over an entity.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A skip/take window applied after ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Number of rows to skip.
    pub skip: u64,
    /// Maximum number of rows to return.
    pub take: u64,
}

/// An immutable query description for entity type `T`.
pub struct Specification<T: Entity> {
    criteria: Option<Predicate<T>>,
    includes: Vec<Relation<T>>,
    ordering: CompiledOrdering<T>,
    window: Option<Window>,
}

impl<T: Entity> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            includes: self.includes.clone(),
            ordering: self.ordering.clone(),
            window: self.window,
        }
    }
}

impl<T: Entity> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("entity_type", &T::TYPE_NAME)
            .field("has_filter", &self.criteria.is_some())
            .field("includes", &self.include_names())
            .field("ordering", &self.ordering)
            .field("window", &self.window)
            .finish()
    }
}

impl<T: Entity> Default for Specification<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T: Entity> Specification<T> {
    /// Start building a specification.
    pub fn builder() -> SpecificationBuilder<T> {
        SpecificationBuilder::new()
    }

    /// Match every row, no includes, no ordering.
    pub fn all() -> Self {
        Self {
            criteria: None,
            includes: Vec::new(),
            ordering: CompiledOrdering::default(),
            window: None,
        }
    }

    /// Match rows satisfying `predicate`.
    pub fn filtered(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            criteria: Some(Arc::new(predicate)),
            ..Self::all()
        }
    }

    /// Whether `entity` passes the filter. True when no filter is set.
    pub fn is_satisfied_by(&self, entity: &T) -> bool {
        self.criteria.as_ref().is_none_or(|p| p(entity))
    }

    /// The filter predicate, if any.
    pub fn criteria(&self) -> Option<&Predicate<T>> {
        self.criteria.as_ref()
    }

    /// Resolved include relations.
    pub fn includes(&self) -> &[Relation<T>] {
        &self.includes
    }

    /// Declared names of the include relations.
    pub fn include_names(&self) -> Vec<&'static str> {
        self.includes.iter().map(|r| r.name).collect()
    }

    /// Ordering criteria, primary first.
    pub fn orderings(&self) -> Vec<OrderingCriterion> {
        self.ordering.criteria()
    }

    /// The compiled ordering chain.
    pub fn ordering(&self) -> &CompiledOrdering<T> {
        &self.ordering
    }

    /// The paging window, if any.
    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Keep only the filter and includes, for counting and existence checks.
    pub fn without_paging(&self) -> Self {
        Self {
            window: None,
            ..self.clone()
        }
    }

    /// Copy of this specification that also loads `relations`.
    pub fn with_includes<'a>(&self, relations: impl IntoIterator<Item = &'a str>) -> AppResult<Self> {
        let mut spec = self.clone();
        for name in relations {
            if !spec.includes.iter().any(|r| r.name.eq_ignore_ascii_case(name)) {
                spec.includes.push(resolve_relation::<T>(name)?);
            }
        }
        Ok(spec)
    }

    /// Apply filter, ordering and window to rows whose includes are
    /// already loaded.
    pub fn evaluate(&self, rows: Vec<T>) -> Vec<T> {
        let matched: Vec<T> = rows.into_iter().filter(|e| self.is_satisfied_by(e)).collect();
        let ordered = self.ordering.sort(matched);
        match self.window {
            Some(w) => ordered
                .into_iter()
                .skip(usize::try_from(w.skip).unwrap_or(usize::MAX))
                .take(usize::try_from(w.take).unwrap_or(usize::MAX))
                .collect(),
            None => ordered,
        }
    }
}

/// Builder for [`Specification`]. Names are checked in [`build`](Self::build).
pub struct SpecificationBuilder<T: Entity> {
    criteria: Option<Predicate<T>>,
    includes: Vec<String>,
    orderings: Vec<OrderingCriterion>,
    window: Option<Window>,
}

impl<T: Entity> Default for SpecificationBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> SpecificationBuilder<T> {
    /// Start with no filter, includes, or ordering.
    pub fn new() -> Self {
        Self {
            criteria: None,
            includes: Vec::new(),
            orderings: Vec::new(),
            window: None,
        }
    }

    /// Set the filter predicate, replacing any earlier one.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.criteria = Some(Arc::new(predicate));
        self
    }

    /// Set an already shared predicate.
    pub fn filter_shared(mut self, predicate: Option<Predicate<T>>) -> Self {
        self.criteria = predicate;
        self
    }

    /// Add an include hint. Duplicates are ignored.
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        if !self.includes.iter().any(|r| r.eq_ignore_ascii_case(&relation)) {
            self.includes.push(relation);
        }
        self
    }

    /// Replace the ordering chain with one primary key.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.orderings.clear();
        self.orderings.push(OrderingCriterion::new(field, direction));
        self
    }

    /// Append a tie-breaking key.
    pub fn then_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.orderings.push(OrderingCriterion::new(field, direction));
        self
    }

    /// Append several criteria in order.
    pub fn orderings(mut self, criteria: impl IntoIterator<Item = OrderingCriterion>) -> Self {
        self.orderings.extend(criteria);
        self
    }

    /// Skip `skip` rows and return at most `take`.
    pub fn window(mut self, skip: u64, take: u64) -> Self {
        self.window = Some(Window { skip, take });
        self
    }

    /// Resolve names and produce the specification.
    pub fn build(self) -> AppResult<Specification<T>> {
        if let Some(w) = self.window {
            if w.take == 0 {
                return Err(AppError::configuration(
                    "Specification window must take at least one row",
                ));
            }
        }
        let includes = self
            .includes
            .iter()
            .map(|name| resolve_relation::<T>(name))
            .collect::<AppResult<Vec<_>>>()?;
        let ordering = CompiledOrdering::compile(&self.orderings)?;
        for key in ordering.keys() {
            if let Some(relation) = key.requires() {
                if !includes.iter().any(|r| r.name.eq_ignore_ascii_case(relation)) {
                    return Err(AppError::configuration(format!(
                        "Ordering by '{}' needs the '{relation}' include",
                        key.field_name()
                    ))
                    .for_entity_type(T::TYPE_NAME));
                }
            }
        }
        Ok(Specification {
            criteria: self.criteria,
            includes,
            ordering,
            window: self.window,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::error::ErrorKind;
    use crate::traits::entity::FieldTable;
    use crate::traits::store::StoredRecord;
    use crate::types::id::EntityId;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: EntityId,
        title: String,
        #[serde(skip)]
        loaded: bool,
    }

    static NOTE_FIELDS: LazyLock<FieldTable<Note>> = LazyLock::new(|| {
        FieldTable::<Note>::new("note")
            .field("id", |n| n.id.into())
            .field("title", |n| n.title.clone().into())
            .field_via("attachmentsLoaded", "attachments", |n| n.loaded.into())
    });

    fn mark_loaded(note: &mut Note, _related: &[StoredRecord]) -> AppResult<()> {
        note.loaded = true;
        Ok(())
    }

    static NOTE_RELATIONS: [Relation<Note>; 1] = [Relation {
        name: "attachments",
        target: "attachment",
        load: mark_loaded,
    }];

    impl Entity for Note {
        const TYPE_NAME: &'static str = "note";

        fn id(&self) -> EntityId {
            self.id
        }

        fn set_id(&mut self, id: EntityId) {
            self.id = id;
        }

        fn fields() -> &'static FieldTable<Self> {
            &NOTE_FIELDS
        }

        fn relations() -> &'static [Relation<Self>] {
            &NOTE_RELATIONS
        }
    }

    fn notes() -> Vec<Note> {
        ["c", "a", "d", "b"]
            .iter()
            .enumerate()
            .map(|(i, t)| Note {
                id: EntityId(i as i64 + 1),
                title: (*t).into(),
                loaded: false,
            })
            .collect()
    }

    #[test]
    fn test_match_all_without_predicate() {
        let spec = Specification::<Note>::all();
        assert!(notes().iter().all(|n| spec.is_satisfied_by(n)));
        assert_eq!(spec.evaluate(notes()).len(), 4);
    }

    #[test]
    fn test_filter_order_window() {
        let spec = Specification::<Note>::builder()
            .filter(|n| n.title != "d")
            .order_by("Title", SortDirection::Descending)
            .window(1, 5)
            .build()
            .unwrap();
        let titles: Vec<String> = spec.evaluate(notes()).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["b", "a"]);
        assert_eq!(spec.orderings(), vec![OrderingCriterion::desc("title")]);
    }

    #[test]
    fn test_include_resolution() {
        let spec = Specification::<Note>::builder()
            .include("Attachments")
            .include("attachments")
            .build()
            .unwrap();
        assert_eq!(spec.include_names(), vec!["attachments"]);

        let err = Specification::<Note>::builder()
            .include("authors")
            .build()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldNotFound);
    }

    #[test]
    fn test_bad_ordering_fails_at_build() {
        let err = Specification::<Note>::builder()
            .order_by("titel", SortDirection::Ascending)
            .build()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldNotFound);
    }

    #[test]
    fn test_zero_take_rejected() {
        let err = Specification::<Note>::builder().window(0, 0).build().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_ordering_on_include_field_needs_include() {
        let err = Specification::<Note>::builder()
            .order_by("attachmentsLoaded", SortDirection::Ascending)
            .build()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);

        let spec = Specification::<Note>::builder()
            .include("attachments")
            .order_by("attachmentsLoaded", SortDirection::Ascending)
            .build()
            .unwrap();
        assert_eq!(spec.orderings(), vec![OrderingCriterion::asc("attachmentsLoaded")]);
    }

    #[test]
    fn test_with_includes_adds_missing_relations() {
        let spec = Specification::<Note>::all()
            .with_includes(["ATTACHMENTS", "attachments"])
            .unwrap();
        assert_eq!(spec.include_names(), vec!["attachments"]);
        assert_eq!(
            Specification::<Note>::all().with_includes(["tags"]).unwrap_err().kind,
            ErrorKind::FieldNotFound
        );
    }
}
