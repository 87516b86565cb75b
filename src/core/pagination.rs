// Offset pagination - page/limit windowing with total-count and
// next/prev indicators carried on every list response.

use serde::Serialize;

/// A validated page request. `page` starts at 1, `limit` is clamped to
/// [1, MAX_LIMIT] so a caller can never ask for an unbounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;
    pub const DEFAULT_LIMIT: u32 = 10;

    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> usize {
        ((self.page - 1) as usize) * (self.limit as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// One page of results plus the pagination metadata of the full result set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pages: u32,
    pub page: u32,
    pub limit: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pages: self.pages,
            page: self.page,
            limit: self.limit,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// Window an already-filtered, already-sorted result set.
pub fn paginate<T>(items: Vec<T>, req: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let limit = req.limit() as u64;
    let pages = (total.div_ceil(limit)) as u32;

    let window: Vec<T> = items
        .into_iter()
        .skip(req.offset())
        .take(req.limit() as usize)
        .collect();

    Page {
        items: window,
        total,
        pages,
        page: req.page(),
        limit: req.limit(),
        has_next: req.page() < pages,
        has_prev: req.page() > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_limit() {
        let req = PageRequest::new(0, 0);
        assert_eq!(req.page(), 1);
        assert_eq!(req.limit(), 1);

        let req = PageRequest::new(2, 500);
        assert_eq!(req.limit(), PageRequest::MAX_LIMIT);
    }

    #[test]
    fn five_items_limit_two_is_deterministic() {
        let items: Vec<i32> = vec![50, 40, 30, 20, 10];

        let p1 = paginate(items.clone(), PageRequest::new(1, 2));
        assert_eq!(p1.items, vec![50, 40]);
        assert_eq!(p1.total, 5);
        assert_eq!(p1.pages, 3);
        assert!(p1.has_next);
        assert!(!p1.has_prev);

        let p2 = paginate(items.clone(), PageRequest::new(2, 2));
        assert_eq!(p2.items, vec![30, 20]);
        assert!(p2.has_next);
        assert!(p2.has_prev);

        let p3 = paginate(items.clone(), PageRequest::new(3, 2));
        assert_eq!(p3.items, vec![10]);
        assert!(!p3.has_next);
        assert!(p3.has_prev);

        // No overlap and no gap across the three pages
        let mut seen: Vec<i32> = Vec::new();
        seen.extend(&p1.items);
        seen.extend(&p2.items);
        seen.extend(&p3.items);
        assert_eq!(seen, items);
    }

    #[test]
    fn empty_set_has_no_pages() {
        let page = paginate(Vec::<i32>::new(), PageRequest::new(1, 10));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn page_beyond_end_is_empty() {
        let page = paginate(vec![1, 2, 3], PageRequest::new(9, 2));
        assert!(page.items.is_empty());
        assert!(!page.has_next);
        assert!(page.has_prev);
    }
}
