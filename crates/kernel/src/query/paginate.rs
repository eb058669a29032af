//! Pagination window and result wrapper.

use serde::Serialize;

use super::error::{QueryError, QueryResult};

/// First page number; pages are 1-indexed.
pub const FIRST_PAGE: u32 = 1;

/// Validated page/per-page pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub per_page: u32,
}

impl PageWindow {
    /// Clamp both values to ≥ 1. Malformed pagination is arbitrary client
    /// input, so it is corrected rather than rejected.
    pub fn clamped(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Reject non-positive values instead of clamping, for callers that want
    /// malformed pagination surfaced.
    pub fn strict(page: u32, per_page: u32) -> QueryResult<Self> {
        if page == 0 || per_page == 0 {
            return Err(QueryError::InvalidPagination { page, per_page });
        }
        Ok(Self { page, per_page })
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// One page of results plus navigation metadata.
///
/// All navigation fields are computed from `total`/`per_page`/`current_page`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub first_page: u32,
    pub last_page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, window: PageWindow) -> Self {
        let per_page = u64::from(window.per_page.max(1));
        let last_page = total.div_ceil(per_page) as u32;

        Self {
            items,
            current_page: window.page,
            per_page: window.per_page,
            total,
            first_page: FIRST_PAGE,
            last_page,
            next_page: (window.page < last_page).then(|| window.page + 1),
            prev_page: (window.page > FIRST_PAGE).then(|| window.page - 1),
        }
    }
}
