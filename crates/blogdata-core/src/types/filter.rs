//! Caller-facing table filter request shape.
//!
//! A [`TableFilter`] is produced by an outer layer (typically decoded from a
//! JSON request body) and converted into a typed
//! [`SearchQuery`](crate::query::SearchQuery) before it reaches a repository.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::sorting::{OrderingCriterion, SortDirection};

/// Free-text search part of a table filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchValue {
    /// Search term; `None` or blank means no text search.
    #[serde(default)]
    pub value: Option<String>,
}

/// Sort and paging part of a table filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortParameters {
    /// Comma-separated field names, e.g. `"title,createdOn"`.
    #[serde(default)]
    pub sort_by: Option<String>,
    /// Comma-separated directions paired positionally with `sort_by`.
    /// Missing entries default to ascending.
    #[serde(default)]
    pub order_by: Option<String>,
    /// Zero-based page number.
    #[serde(default)]
    pub current_page: i64,
    /// Page size; `None` uses the configured default.
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// A page + sort + search request for one table of entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFilter {
    /// Free-text search.
    #[serde(default)]
    pub search: SearchValue,
    /// Sorting and paging.
    #[serde(default)]
    pub sort_parameters: SortParameters,
}

impl TableFilter {
    /// Return the trimmed search term, if any.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Pair `sort_by` and `order_by` into ordering criteria.
    ///
    /// More directions than fields is rejected; fewer is padded with
    /// ascending.
    pub fn criteria(&self) -> AppResult<Vec<OrderingCriterion>> {
        let fields: Vec<&str> = split_list(self.sort_parameters.sort_by.as_deref());
        let directions: Vec<&str> = split_list(self.sort_parameters.order_by.as_deref());

        if directions.len() > fields.len() {
            return Err(AppError::configuration(format!(
                "orderBy lists {} directions for {} sort fields",
                directions.len(),
                fields.len()
            )));
        }

        fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let direction = match directions.get(i) {
                    Some(d) => d.parse()?,
                    None => SortDirection::Ascending,
                };
                Ok(OrderingCriterion::new(*field, direction))
            })
            .collect()
    }
}

fn split_list(raw: Option<&str>) -> Vec<&str> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
