//! Counted, paginated result windows.
//!
//! Pages are zero-indexed: page `n` holds the records at positions
//! `[n * page_size, n * page_size + page_size)` of the (sorted) result set.

use serde::{Deserialize, Serialize};

use crate::error::{RecordStoreError, RecordStoreResult};

/// A single page of results plus the totals needed to navigate the rest.
///
/// Serializes as `{ "dataSet": [...], "totalCount": 25, "totalPage": 3, "page": 0, "pageSize": 10 }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The records in this window.
    #[serde(rename = "dataSet")]
    pub items: Vec<T>,
    /// Number of records matching the filter, across all pages.
    pub total_count: u64,
    /// Number of pages, `ceil(total_count / page_size)`.
    pub total_page: u64,
    /// The zero-indexed page this window was taken from.
    pub page: usize,
    /// The requested page size.
    pub page_size: usize,
}

impl<T> Page<T> {
    /// Creates a builder for a page holding `items`.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Returns `true` when a page after this one holds records.
    pub fn has_next(&self) -> bool {
        (self.page as u64) + 1 < self.total_page
    }

    /// Maps every item, keeping the totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            total_page: self.total_page,
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Maps every item through a fallible conversion, keeping the totals.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<Vec<U>, E>>()?,
            total_count: self.total_count,
            total_page: self.total_page,
            page: self.page,
            page_size: self.page_size,
        })
    }
}

/// Builder for [`Page`]; computes `total_page` from the count and the request.
pub struct PageBuilder<T> {
    items: Vec<T>,
    total_count: u64,
    request: PageRequest,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            total_count: 0,
            request: PageRequest::default(),
        }
    }

    /// Sets the number of records matching the filter.
    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = total_count;
        self
    }

    /// Sets the request the window was taken for.
    pub fn with_request(mut self, request: PageRequest) -> Self {
        self.request = request;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            total_count: self.total_count,
            total_page: self.request.total_pages(self.total_count),
            page: self.request.page,
            page_size: self.request.page_size,
        }
    }
}

/// Which page to read and how large pages are.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// The page number (zero-indexed).
    pub page: usize,
    /// Number of records per page.
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    /// Number of records to skip to reach this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }

    /// Number of pages needed for `total_count` records.
    pub fn total_pages(&self, total_count: u64) -> u64 {
        match self.page_size {
            0 => 0,
            size => total_count.div_ceil(size as u64),
        }
    }

    /// Checks that the request can address a window.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidArgument`] when `page_size` is zero.
    pub fn validate(&self) -> RecordStoreResult<()> {
        if self.page_size == 0 {
            return Err(RecordStoreError::InvalidArgument("page size must be at least 1".into()));
        }

        Ok(())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, page_size: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_windows_and_totals() {
        let request = PageRequest::new(2, 10);
        let page = Page::builder(vec![1, 2, 3, 4, 5])
            .with_total_count(25)
            .with_request(request)
            .build();

        assert_eq!(request.offset(), 20);
        assert_eq!(page.total_page, 3);
        assert!(!page.has_next());
        assert!(Page::builder(Vec::<i32>::new())
            .with_total_count(25)
            .with_request(PageRequest::new(1, 10))
            .build()
            .has_next());
    }

    #[test]
    fn empty_results_have_no_pages() {
        assert_eq!(PageRequest::new(0, 10).total_pages(0), 0);
        assert_eq!(PageRequest::new(0, 10).total_pages(10), 1);
        assert_eq!(PageRequest::new(0, 10).total_pages(11), 2);
    }

    #[test]
    fn rejects_empty_pages() {
        assert!(matches!(
            PageRequest::new(0, 0).validate(),
            Err(RecordStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn serializes_with_wire_names() {
        let page = Page::builder(vec!["a"])
            .with_total_count(1)
            .with_request(PageRequest::new(0, 10))
            .build();

        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({
                "dataSet": ["a"],
                "totalCount": 1,
                "totalPage": 1,
                "page": 0,
                "pageSize": 10,
            })
        );
    }
}
