//! Page/sort request normalization shared by every list endpoint.

use serde::Serialize;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A normalized page request.
///
/// Unparseable or out-of-range input never fails: the page falls back to 1 and
/// the page size to 10 (sizes above 100 are treated as out of range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        let page = if page < 1 {
            DEFAULT_PAGE
        } else {
            u32::try_from(page).unwrap_or(DEFAULT_PAGE)
        };
        let page_size = if page_size < 1 || page_size > i64::from(MAX_PAGE_SIZE) {
            DEFAULT_PAGE_SIZE
        } else {
            page_size as u32
        };
        Self { page, page_size }
    }

    /// Build from raw query-string values (`page`, `pageSize`).
    pub fn from_query(page: Option<&str>, page_size: Option<&str>) -> Self {
        let parse = |raw: Option<&str>, default: u32| {
            raw.and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(i64::from(default))
        };
        Self::new(parse(page, DEFAULT_PAGE), parse(page_size, DEFAULT_PAGE_SIZE))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(i64::from(DEFAULT_PAGE), i64::from(DEFAULT_PAGE_SIZE))
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Total rows matching the query (across all pages).
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: i64,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, request: PageRequest) -> Self {
        let size = i64::from(request.page_size());
        Self {
            total,
            page: request.page(),
            page_size: request.page_size(),
            total_pages: (total + size - 1) / size,
            data,
        }
    }

    /// Slice an already-sorted, fully materialized result set.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as i64;
        let data = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size() as usize)
            .collect();
        Self::new(data, total, request)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

/// Sort direction for list queries; anything other than `asc` sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_and_garbage_values() {
        let req = PageRequest::from_query(None, None);
        assert_eq!((req.page(), req.page_size()), (1, 10));

        let req = PageRequest::from_query(Some("abc"), Some("-4"));
        assert_eq!((req.page(), req.page_size()), (1, 10));
    }

    #[test]
    fn page_size_above_cap_falls_back_to_default() {
        let req = PageRequest::from_query(Some("3"), Some("101"));
        assert_eq!((req.page(), req.page_size()), (3, 10));

        let req = PageRequest::from_query(Some("2"), Some("100"));
        assert_eq!((req.page(), req.page_size()), (2, 100));
        assert_eq!(req.offset(), 100);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(vec![1, 2, 3], 23, PageRequest::new(1, 10));
        assert_eq!(page.total_pages, 3);
        let empty: Page<i32> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn from_sorted_slices_the_requested_window() {
        let page = Page::from_sorted((1..=25).collect::<Vec<_>>(), PageRequest::new(3, 10));
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
    }

    #[test]
    fn sort_direction_defaults_to_desc() {
        assert_eq!(SortDirection::parse(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(Some("sideways")), SortDirection::Desc);
        assert_eq!(SortDirection::parse(None), SortDirection::Desc);
    }
}
