// ============================================================================
// Pagination
// ============================================================================
//
// Query contract shared with the downstream CRUD services:
//   page      1-based, defaults to 1 when absent, malformed or <= 0
//   pageSize  clamped to [1, 100], defaults to DEFAULT_PAGE_SIZE
// Response: {data, page, pageSize, totalItems, totalPages}
//
// ============================================================================

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: if page <= 0 {
                1
            } else {
                page.min(i64::from(u32::MAX)) as u32
            },
            page_size: page_size.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32,
        }
    }

    /// Build from raw query values
    pub fn from_query(page: Option<&str>, page_size: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1);
        let page_size = page_size
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(i64::from(DEFAULT_PAGE_SIZE));
        Self::new(page, page_size)
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total_items: i64) -> Self {
        let size = i64::from(pagination.page_size);
        Self {
            data,
            page: pagination.page,
            page_size: pagination.page_size,
            total_items,
            total_pages: (total_items + size - 1) / size,
        }
    }
}
