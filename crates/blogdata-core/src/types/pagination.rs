//! Paged result type returned by searches.

use serde::{Deserialize, Serialize};

/// A materialized page of results plus total-count metadata.
///
/// `total_items` counts every item that matched the filter before paging,
/// so it is the same for every page of one query, including pages past the
/// end. Page numbers are zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedListResult<T> {
    /// The items on this page, in query order.
    pub items: Vec<T>,
    /// Total number of matching items across all pages.
    pub total_items: u64,
    /// Current page number (zero-based).
    pub page_number: u64,
    /// Number of items per page.
    pub page_size: u64,
    /// Total number of pages (zero when nothing matched).
    pub total_pages: u64,
    /// Whether there is a next page.
    pub has_next: bool,
    /// Whether there is a previous page.
    pub has_previous: bool,
}

impl<T> PagedListResult<T> {
    /// Create a new paged result.
    pub fn new(items: Vec<T>, page_number: u64, page_size: u64, total_items: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(page_size)
        };
        Self {
            items,
            total_items,
            page_number,
            page_size,
            total_pages,
            has_next: page_number + 1 < total_pages,
            has_previous: page_number > 0,
        }
    }

    /// Create an empty result for the given page.
    pub fn empty(page_number: u64, page_size: u64) -> Self {
        Self::new(Vec::new(), page_number, page_size, 0)
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert the items while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedListResult<U> {
        PagedListResult {
            items: self.items.into_iter().map(f).collect(),
            total_items: self.total_items,
            page_number: self.page_number,
            page_size: self.page_size,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_metadata() {
        let page = PagedListResult::new(vec![1, 2, 3, 4, 5], 2, 10, 25);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next);
        assert!(page.has_previous);

        let first = PagedListResult::new(vec![0; 10], 0, 10, 25);
        assert!(first.has_next);
        assert!(!first.has_previous);
    }

    #[test]
    fn test_empty_page() {
        let page: PagedListResult<u8> = PagedListResult::empty(0, 10);
        assert_eq!(page.total_pages, 0);
        assert!(page.is_empty());
        assert!(!page.has_next);
    }

    #[test]
    fn test_camel_case_json() {
        let page = PagedListResult::new(vec!["a"], 0, 1, 1);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalItems"], 1);
        assert_eq!(json["pageNumber"], 0);
        assert_eq!(json["pageSize"], 1);
        assert_eq!(json["items"][0], "a");
    }
}
