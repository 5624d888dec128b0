//! List filters and pagination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page used when the caller asks for page 0
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when the caller asks for size 0
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Ordering of list results by id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Pagination and ordering for a list call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub size: u32,
    /// Ordering by id
    pub order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
            order: SortOrder::Asc,
        }
    }
}

impl ListQuery {
    /// Create a query for `page` of `size` items
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            order: SortOrder::Asc,
        }
    }

    /// Change the ordering
    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Page size with 0 replaced by the default
    pub fn limit(&self) -> u32 {
        if self.size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.size
        }
    }

    /// Number of rows to skip
    pub fn offset(&self) -> u64 {
        let page = self.page.max(DEFAULT_PAGE);
        u64::from(page - 1) * u64::from(self.limit())
    }
}

/// One page of results plus the total matching the filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

/// Host list filter; unset fields do not constrain the result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFilter {
    /// Substring of the display name
    pub name: Option<String>,
    /// Exact label
    pub label: Option<String>,
    /// Exact address
    pub address: Option<String>,
    /// Exact port
    pub port: Option<u16>,
    /// Substring of the login user
    pub username: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
}

/// Package list filter; unset fields do not constrain the result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFilter {
    /// Exact label
    pub label: Option<String>,
    /// Substring of the version
    pub version: Option<String>,
    pub uploaded_after: Option<DateTime<Utc>>,
    pub uploaded_before: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query() {
        let query = ListQuery::default();
        assert_eq!(query.limit(), 10);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_offset_of_later_page() {
        let query = ListQuery::new(3, 20);
        assert_eq!(query.offset(), 40);
        assert_eq!(query.limit(), 20);
    }

    #[test]
    fn test_zero_page_and_size_fall_back() {
        let query = ListQuery::new(0, 0);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_sort_order_serde() {
        let json = serde_json::to_string(&SortOrder::Desc).unwrap();
        assert_eq!(json, r#""desc""#);
    }
}
