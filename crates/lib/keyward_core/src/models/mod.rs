//! Domain models.

pub mod auth;
pub mod group;

/// One page of an in-memory filtered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Largest accepted page size.
    pub const MAX_LIMIT: usize = 100;

    /// Slice `all` into page `page` (1-based) of `limit` items.
    pub fn slice(all: Vec<T>, page: usize, limit: usize) -> Self {
        let page = page.max(1);
        let limit = limit.clamp(1, Self::MAX_LIMIT);
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            items,
            total,
            page,
            limit,
        }
    }

    pub fn empty(page: usize, limit: usize) -> Self {
        Self::slice(Vec::new(), page, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_requested_page() {
        let page = Page::slice((1..=25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
    }

    #[test]
    fn clamps_page_and_limit() {
        let page = Page::slice(vec![1, 2, 3], 0, 0);
        assert_eq!((page.page, page.limit), (1, 1));
        assert_eq!(page.items, vec![1]);

        let page = Page::slice(vec![1, 2, 3], 99, 1000);
        assert!(page.items.is_empty());
        assert_eq!(page.limit, Page::<i32>::MAX_LIMIT);
    }
}
