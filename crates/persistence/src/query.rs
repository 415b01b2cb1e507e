use domain::{Filter, Predicate, Sort, SortKey};

/// Page size used when a search does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Builder for a paged repository search.
///
/// Defaults to match-all, store order, page 1 of [`DEFAULT_PAGE_SIZE`] rows.
pub struct Search<T> {
    /// Filter applied before counting; `None` matches every row.
    pub filter: Option<Predicate<T>>,

    /// Ordering applied after counting.
    pub order_by: Option<Sort<T>>,

    /// One-based page number.
    pub page: u32,

    /// Rows per page.
    pub page_size: u32,
}

impl<T> Search<T> {
    /// Creates a search with the default paging.
    pub fn new() -> Self {
        Self {
            filter: None,
            order_by: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Creates a search for rows matching `predicate`.
    pub fn matching(predicate: Predicate<T>) -> Self {
        Self::new().filter(predicate)
    }

    /// Sets the filter.
    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Sets the ordering.
    pub fn order_by(mut self, sort: Sort<T>) -> Self {
        self.order_by = Some(sort);
        self
    }

    /// Sets the one-based page number.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the number of rows per page.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

impl<T> Clone for Search<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            page: self.page,
            page_size: self.page_size,
        }
    }
}

impl<T> std::fmt::Debug for Search<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("filter", &self.filter)
            .field("order_by", &self.order_by)
            .field("page", &self.page)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<T> Default for Search<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An untyped fetch request, as a store sees it.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    /// Rows must satisfy this filter.
    pub filter: Filter,

    /// Sort keys, most significant first. Empty means store order.
    pub sort: Vec<SortKey>,

    /// Number of matching rows to skip.
    pub offset: u64,

    /// Maximum number of rows to return.
    pub limit: Option<u64>,
}

impl RecordQuery {
    /// Creates a query returning every row that satisfies `filter`.
    pub fn filtered(filter: &Filter) -> Self {
        Self {
            filter: filter.clone(),
            sort: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Creates a query returning every row.
    pub fn all() -> Self {
        Self::filtered(&Filter::Const(true))
    }

    /// Sets the sort keys.
    pub fn sort(mut self, keys: &[SortKey]) -> Self {
        self.sort = keys.to_vec();
        self
    }

    /// Sets the window of rows to return.
    pub fn window(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}
