//! Pagination types shared by every listing operation

use serde::{Deserialize, Serialize};

/// Largest page size a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub page_size: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters, clamping out-of-range values
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }

    /// Rows to take
    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

/// Page metadata returned alongside the data slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl PageMeta {
    pub fn new(total: i64, params: &ListParams) -> Self {
        let total = total.max(0);
        let page_size = params.page_size.max(1) as i64;
        Self {
            total,
            page: params.page,
            page_size: params.page_size,
            total_pages: ((total + page_size - 1) / page_size) as u32,
        }
    }
}

/// Paginated result container: `{ data, meta: { total, page, pageSize, totalPages } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            data,
            meta: PageMeta::new(total, params),
        }
    }

    /// Transform each item while keeping the page metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }

    pub fn has_next(&self) -> bool {
        self.meta.page < self.meta.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.meta.page > 1
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_list_params_clamps() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, MAX_PAGE_SIZE);

        let params = ListParams::new(3, 0);
        assert_eq!(params.page_size, 1);
    }

    #[test]
    fn test_offset_and_limit() {
        let params = ListParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
        assert_eq!(ListParams::default().offset(), 0);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(PageMeta::new(25, &ListParams::new(1, 10)).total_pages, 3);
        assert_eq!(PageMeta::new(30, &ListParams::new(1, 10)).total_pages, 3);
        assert_eq!(PageMeta::new(0, &ListParams::new(1, 10)).total_pages, 0);
        assert_eq!(PageMeta::new(1, &ListParams::new(1, 10)).total_pages, 1);
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let page = Paginated::new(vec![1, 2], 2, &ListParams::new(1, 10));
        let json = serde_json::to_value(&page).unwrap();

        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["meta"]["pageSize"], 10);
        assert_eq!(json["meta"]["totalPages"], 1);
        assert_eq!(json["meta"]["total"], 2);
    }

    #[test]
    fn test_map_keeps_meta() {
        let page = Paginated::new(vec![1, 2, 3], 13, &ListParams::new(2, 3));
        let mapped = page.map(|n| n * 10);

        assert_eq!(mapped.data, vec![10, 20, 30]);
        assert_eq!(mapped.meta.total_pages, 5);
        assert!(mapped.has_next());
        assert!(mapped.has_prev());
    }

    proptest! {
        #[test]
        fn total_pages_is_ceiling(total in 0i64..10_000, page_size in 1u32..=100) {
            let meta = PageMeta::new(total, &ListParams::new(1, page_size));
            let pages = meta.total_pages as i64;
            prop_assert!(pages * page_size as i64 >= total);
            prop_assert!(pages == 0 || (pages - 1) * (page_size as i64) < total);
        }
    }
}
