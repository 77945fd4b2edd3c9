//! Offset pagination shared by read-side queries
//!
//! # Example
//!
//! ```
//! use fanbase_core::pagination::{PageRequest, PaginatedResponse};
//!
//! let page = PageRequest::from_page(2, 10);
//! assert_eq!(page.offset, 10);
//!
//! let response = PaginatedResponse::new(vec!["a", "b"], 12, page);
//! assert!(!response.has_more);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default number of items per page
pub const DEFAULT_LIMIT: usize = 20;

/// Maximum number of items per page
pub const MAX_LIMIT: usize = 100;

/// Offset/limit window into a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of items to skip
    pub offset: usize,
    /// Maximum number of items to return, clamped to `1..=MAX_LIMIT`
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Build from a 1-based page number
    pub fn from_page(page: usize, per_page: usize) -> Self {
        let limit = per_page.clamp(1, MAX_LIMIT);
        Self {
            offset: (page.max(1) - 1) * limit,
            limit,
        }
    }

    /// Parse `page` / `per_page` query parameters, falling back to defaults
    pub fn from_query_params(params: &HashMap<String, String>) -> Self {
        let page = params
            .get("page")
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(1);
        let per_page = params
            .get("per_page")
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(DEFAULT_LIMIT);

        Self::from_page(page, per_page)
    }

    /// 1-based page number this request points at
    pub fn page_number(&self) -> usize {
        self.offset / self.limit + 1
    }
}

/// Page of results plus totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
    pub page: usize,
    pub per_page: usize,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: usize, request: PageRequest) -> Self {
        let has_more = request.offset + items.len() < total;
        Self {
            items,
            total,
            has_more,
            page: request.page_number(),
            per_page: request.limit,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    /// Total number of pages for the current page size
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page.max(1))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            has_more: self.has_more,
            page: self.page,
            per_page: self.per_page,
        }
    }
}
