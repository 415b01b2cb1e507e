//! Page metadata for search results.

use serde::Serialize;

use crate::{PersistenceError, Result};

/// Count and position metadata describing one page of a filtered result set.
///
/// Built once per search from the filtered count, before paging is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PagedResult {
    page: u32,
    page_size: u32,
    total_count: u64,
    total_pages: u64,
}

impl PagedResult {
    /// Creates page metadata. Both `page` and `page_size` must be at least 1.
    pub fn new(page: u32, page_size: u32, total_count: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(PersistenceError::OutOfRange {
                parameter: "page_size",
                value: page_size,
            });
        }
        if page == 0 {
            return Err(PersistenceError::OutOfRange {
                parameter: "page",
                value: page,
            });
        }
        Ok(Self {
            page,
            page_size,
            total_count,
            total_pages: total_count.div_ceil(u64::from(page_size)),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of rows matching the filter, across all pages.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page) < self.total_pages
    }

    /// Number of matching rows before this page.
    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// One-based index of the first row on this page, or 0 if the page is empty.
    pub fn first_row_on_page(&self) -> u64 {
        if self.skip() >= self.total_count {
            0
        } else {
            self.skip() + 1
        }
    }

    /// One-based index of the last row on this page, or 0 if the page is empty.
    pub fn last_row_on_page(&self) -> u64 {
        if self.first_row_on_page() == 0 {
            return 0;
        }
        (u64::from(self.page) * u64::from(self.page_size)).min(self.total_count)
    }
}

/// One page of materialized entities with its metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub paging: PagedResult,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transforms the items, keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            paging: self.paging,
        }
    }
}
