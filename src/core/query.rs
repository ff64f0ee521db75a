//! Query parameters and pagination utilities

use serde::{Deserialize, Serialize};

/// Query parameters of a read request
///
/// Deserializable from a URL query string; every field has a default.
///
/// # Example
/// ```rust,ignore
/// // GET /articles?include=author.articles,tags&page=2&size=10
/// // GET /articles?page=-1            (last page)
/// let params = QueryParams {
///     include: Some("author.articles,tags".into()),
///     page: 2,
///     size: Some(10),
/// };
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Comma separated include chains, e.g. `author.articles,tags`
    pub include: Option<String>,

    /// Page number. Positive numbers count from the first page (0 is read as
    /// 1), negative numbers count back from the last page.
    pub page: i64,

    /// Page size, the configured default when absent
    pub size: Option<usize>,
}

fn default_page() -> i64 {
    1
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            include: None,
            page: default_page(),
            size: None,
        }
    }
}

impl QueryParams {
    /// Parameters that only include the given chains
    pub fn with_include(include: impl Into<String>) -> Self {
        Self {
            include: Some(include.into()),
            page: default_page(),
            size: None,
        }
    }

    /// The include parameter, if one was supplied
    pub fn include(&self) -> Option<&str> {
        self.include.as_deref()
    }

    /// Page size, falling back to `default_size`
    pub fn page_size(&self, default_size: usize) -> usize {
        self.size.unwrap_or(default_size)
    }
}

/// Select one page of `items`.
///
/// A `size` of 0 disables paging. For negative page numbers the page is
/// computed back from the end: page -1 holds the last `size` items, and a
/// page reaching before the first item is cut short.
pub fn page<T>(items: Vec<T>, size: usize, number: i64) -> Vec<T> {
    if size == 0 {
        return items;
    }

    if number >= 0 {
        let number = number.max(1) as usize;
        return items
            .into_iter()
            .skip((number - 1).saturating_mul(size))
            .take(size)
            .collect();
    }

    let total = items.len() as i64;
    let size = size as i64;
    let virtual_first = total - size.saturating_mul(number.saturating_abs());
    let take = size.min(virtual_first + size);
    if take <= 0 {
        return Vec::new();
    }

    items
        .into_iter()
        .skip(virtual_first.max(0) as usize)
        .take(take as usize)
        .collect()
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    /// Requested page number
    pub page: i64,

    /// Number of items per page
    pub size: usize,

    /// Total number of stored items
    pub total: usize,

    /// Total number of pages
    pub total_pages: usize,
}

impl PaginationMeta {
    pub fn new(page: i64, size: usize, total: usize) -> Self {
        let total_pages = if total == 0 || size == 0 {
            usize::from(total > 0)
        } else {
            total.div_ceil(size)
        };

        Self {
            page,
            size,
            total,
            total_pages,
        }
    }
}
