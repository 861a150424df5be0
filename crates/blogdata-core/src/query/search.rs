//! Search and pagination over a base sequence.
//!
//! A [`SearchQuery`] combines free-text search, an optional programmatic
//! filter, an ordering chain and a zero-based page. All of it is validated
//! when the query is built; running it cannot fail.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::PagingConfig;
use crate::error::AppError;
use crate::query::ordering::CompiledOrdering;
use crate::query::specification::Predicate;
use crate::result::AppResult;
use crate::traits::entity::{Entity, Field};
use crate::types::filter::TableFilter;
use crate::types::pagination::PagedListResult;
use crate::types::sorting::OrderingCriterion;

/// A validated page + sort + search request for entity type `T`.
pub struct SearchQuery<T: Entity> {
    term: Option<String>,
    search_fields: Vec<Field<T>>,
    filter: Option<Predicate<T>>,
    ordering: CompiledOrdering<T>,
    page_number: u64,
    page_size: u64,
}

impl<T: Entity> Clone for SearchQuery<T> {
    fn clone(&self) -> Self {
        Self {
            term: self.term.clone(),
            search_fields: self.search_fields.clone(),
            filter: self.filter.clone(),
            ordering: self.ordering.clone(),
            page_number: self.page_number,
            page_size: self.page_size,
        }
    }
}

impl<T: Entity> fmt::Debug for SearchQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuery")
            .field("entity_type", &T::TYPE_NAME)
            .field("term", &self.term)
            .field("search_fields", &self.search_fields)
            .field("has_filter", &self.filter.is_some())
            .field("ordering", &self.ordering)
            .field("page_number", &self.page_number)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<T: Entity> SearchQuery<T> {
    /// Create a query for one page. `page_number` is zero-based.
    ///
    /// Search fields default to [`Entity::searchable_fields`].
    pub fn new(page_number: i64, page_size: i64) -> AppResult<Self> {
        if page_size <= 0 {
            return Err(AppError::configuration(format!(
                "Page size must be positive, got {page_size}"
            )));
        }
        if page_number < 0 {
            return Err(AppError::configuration(format!(
                "Page number must not be negative, got {page_number}"
            )));
        }
        let table = T::fields();
        let search_fields = T::searchable_fields()
            .iter()
            .map(|name| table.resolve(name))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            term: None,
            search_fields,
            filter: None,
            ordering: CompiledOrdering::default(),
            page_number: page_number as u64,
            page_size: page_size as u64,
        })
    }

    /// Build a query from a caller-supplied table filter, applying the
    /// configured default and maximum page size.
    pub fn from_table_filter(filter: &TableFilter, paging: &PagingConfig) -> AppResult<Self> {
        let page_size = filter
            .sort_parameters
            .page_size
            .unwrap_or(i64::from(paging.default_page_size));
        if page_size > i64::from(paging.max_page_size) {
            return Err(AppError::configuration(format!(
                "Page size {page_size} exceeds the maximum of {}",
                paging.max_page_size
            )));
        }
        let query = Self::new(filter.sort_parameters.current_page, page_size)?
            .order_by(&filter.criteria()?)?;
        Ok(match filter.search_term() {
            Some(term) => query.search(term),
            None => query,
        })
    }

    /// Set the free-text search term. Blank terms disable text search.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.term = (!term.is_empty()).then(|| term.to_lowercase());
        self
    }

    /// Replace the fields the search term is matched against.
    pub fn search_fields<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> AppResult<Self> {
        let table = T::fields();
        self.search_fields = names
            .into_iter()
            .map(|name| table.resolve(name))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(self)
    }

    /// Set the programmatic filter. It is ANDed with the text search.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Replace the ordering chain.
    pub fn order_by(mut self, criteria: &[OrderingCriterion]) -> AppResult<Self> {
        self.ordering = CompiledOrdering::compile(criteria)?;
        Ok(self)
    }

    /// Use `ordering` when the query names none of its own.
    pub fn or_ordering(mut self, ordering: &CompiledOrdering<T>) -> Self {
        if self.ordering.is_empty() {
            self.ordering = ordering.clone();
        }
        self
    }

    /// The lowercased search term, if any.
    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }

    /// Zero-based page number.
    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    /// Page size.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Requested ordering criteria.
    pub fn orderings(&self) -> Vec<OrderingCriterion> {
        self.ordering.criteria()
    }

    /// Includes the ordering and, when a term is set, the search fields
    /// depend on.
    pub fn required_relations(&self) -> Vec<&'static str> {
        let searched = self
            .term
            .is_some()
            .then_some(self.search_fields.iter())
            .into_iter()
            .flatten()
            .filter_map(|f| f.requires);
        let mut relations: Vec<&'static str> = Vec::new();
        for relation in self.ordering.keys().iter().filter_map(|k| k.requires()).chain(searched) {
            if !relations.contains(&relation) {
                relations.push(relation);
            }
        }
        relations
    }

    /// Whether `entity` passes the text search and the filter.
    pub fn matches(&self, entity: &T) -> bool {
        let text_ok = match &self.term {
            Some(term) => self
                .search_fields
                .iter()
                .any(|f| f.get(entity).contains_lowercase(term)),
            None => true,
        };
        text_ok && self.filter.as_ref().is_none_or(|p| p(entity))
    }

    fn effective_ordering(&self) -> CompiledOrdering<T> {
        if self.ordering.is_empty() {
            CompiledOrdering::by_identity()
        } else {
            self.ordering.clone()
        }
    }
}

/// Run `query` over `base` and return the requested page.
///
/// `total_items` counts every match before paging. Without an ordering the
/// rows are ordered by id so that paging stays deterministic.
pub fn search<T: Entity>(
    base: impl IntoIterator<Item = T>,
    query: &SearchQuery<T>,
) -> PagedListResult<T> {
    let matched: Vec<T> = base.into_iter().filter(|e| query.matches(e)).collect();
    let total_items = matched.len() as u64;
    let ordered = query.effective_ordering().sort(matched);

    let skip = query.page_number.saturating_mul(query.page_size);
    let items: Vec<T> = ordered
        .into_iter()
        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
        .take(usize::try_from(query.page_size).unwrap_or(usize::MAX))
        .collect();

    debug!(
        entity_type = T::TYPE_NAME,
        total_items,
        page_number = query.page_number,
        page_size = query.page_size,
        returned = items.len(),
        "Search page materialized"
    );

    PagedListResult::new(items, query.page_number, query.page_size, total_items)
}
