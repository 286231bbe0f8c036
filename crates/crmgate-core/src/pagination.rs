//! Page/pageSize normalization and the paginated result envelope.
//!
//! Normalization happens before anything else looks at the request so that a
//! request with default-filled values and one with explicit defaults are the
//! same request (same cache fingerprint, same SQL window).

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw pagination input as it arrives from a caller.
///
/// Values are signed so that negative input can be normalized instead of
/// rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self { page, page_size }
    }

    /// Resolves defaults and bounds.
    ///
    /// - `page`: absent or < 1 becomes 1
    /// - `page_size`: absent or < 1 becomes [`DEFAULT_PAGE_SIZE`], above
    ///   [`MAX_PAGE_SIZE`] is clamped to it
    pub fn normalize(self) -> PageWindow {
        let page = match self.page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let page_size = match self.page_size {
            Some(s) if s >= 1 => s.min(i64::from(MAX_PAGE_SIZE)) as u32,
            _ => DEFAULT_PAGE_SIZE,
        };
        PageWindow { page, page_size }
    }
}

/// A normalized pagination window. `page >= 1`, `1 <= page_size <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
}

impl PageWindow {
    /// Row offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        PageRequest::default().normalize()
    }
}

/// One page of results plus the filter-wide total.
///
/// `total` counts every row matching the filter, independent of the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, window: PageWindow) -> Self {
        Self {
            items,
            total,
            page: window.page,
            page_size: window.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let w = PageRequest::default().normalize();
        assert_eq!(w, PageWindow { page: 1, page_size: 10 });
    }

    #[test]
    fn test_explicit_defaults_match_filled_defaults() {
        assert_eq!(
            PageRequest::new(Some(1), Some(10)).normalize(),
            PageRequest::new(None, None).normalize()
        );
    }

    #[test]
    fn test_bounds() {
        assert_eq!(PageRequest::new(Some(0), Some(0)).normalize().page, 1);
        assert_eq!(PageRequest::new(Some(-4), None).normalize().page, 1);
        assert_eq!(PageRequest::new(None, Some(-1)).normalize().page_size, 10);
        assert_eq!(PageRequest::new(None, Some(1)).normalize().page_size, 1);
        assert_eq!(PageRequest::new(None, Some(100)).normalize().page_size, 100);
        assert_eq!(PageRequest::new(None, Some(101)).normalize().page_size, 100);
        assert_eq!(
            PageRequest::new(Some(i64::MAX), None).normalize().page,
            u32::MAX
        );
    }

    #[test]
    fn test_offset() {
        let w = PageRequest::new(Some(3), Some(25)).normalize();
        assert_eq!(w.offset(), 50);
        assert_eq!(w.limit(), 25);
    }

    #[test]
    fn test_page_serializes_camel_case() {
        let page = Page::new(vec![1, 2], 12, PageRequest::new(Some(2), Some(2)).normalize());
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["total"], 12);
        assert_eq!(json["pageSize"], 2);
        assert_eq!(json["items"], serde_json::json!([1, 2]));
    }
}
