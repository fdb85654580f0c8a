//! Fixed-size page slicing for post listings.
//!
//! Page resolution is lenient: a missing or malformed page number yields the
//! first page and an out-of-range number is clamped to the nearest existing
//! page, so a listing never fails because of its `page` parameter.

use std::num::IntErrorKind;

pub const POSTS_PER_PAGE: u64 = 10;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Paginator {
    count: u64,
    per_page: u64,
}

/// The slice of a collection a single page covers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

impl Paginator {
    /// # Panics
    /// If `per_page` is zero.
    #[must_use]
    pub fn new(count: u64, per_page: u64) -> Self {
        assert!(per_page > 0, "per_page must be positive");
        Self { count, per_page }
    }

    /// An empty collection still has one (empty) page.
    #[must_use]
    pub fn num_pages(&self) -> u64 {
        self.count.div_ceil(self.per_page).max(1)
    }

    #[must_use]
    pub fn page(&self, number: u64) -> PageWindow {
        let num_pages = self.num_pages();
        let number = number.clamp(1, num_pages);

        PageWindow {
            number,
            num_pages,
            count: self.count,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }

    /// Resolves a raw `?page=` value.
    #[must_use]
    pub fn get_page(&self, requested: Option<&str>) -> PageWindow {
        let number = match requested.map(|raw| raw.trim().parse::<i64>()) {
            None => 1,
            Some(Ok(number)) => u64::try_from(number).unwrap_or(1),
            Some(Err(err)) if *err.kind() == IntErrorKind::PosOverflow => u64::MAX,
            Some(Err(_)) => 1,
        };

        self.page(number)
    }
}

impl PageWindow {
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    #[must_use]
    pub fn previous_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    #[must_use]
    pub fn next_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }
}

impl<T> Page<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::pagination::{POSTS_PER_PAGE, Paginator};

    #[test]
    fn thirteen_items_split_into_ten_and_three() {
        let paginator = Paginator::new(13, POSTS_PER_PAGE);
        assert_eq!(paginator.num_pages(), 2);

        let first = paginator.get_page(None);
        assert_eq!((first.number, first.offset, first.limit), (1, 0, 10));
        assert!(first.has_next());
        assert!(!first.has_previous());

        let second = paginator.get_page(Some("2"));
        assert_eq!((second.number, second.offset), (2, 10));
        assert_eq!(second.count - second.offset, 3);
        assert_eq!(second.next_number(), None);
        assert_eq!(second.previous_number(), Some(1));
    }

    #[test]
    fn out_of_range_pages_clamp() {
        let paginator = Paginator::new(25, POSTS_PER_PAGE);

        assert_eq!(paginator.get_page(Some("99")).number, 3);
        assert_eq!(paginator.get_page(Some("99999999999999999999999")).number, 3);
        assert_eq!(paginator.get_page(Some("0")).number, 1);
        assert_eq!(paginator.get_page(Some("-4")).number, 1);
        assert_eq!(paginator.get_page(Some("abc")).number, 1);
        assert_eq!(paginator.get_page(Some("")).number, 1);
    }

    #[test]
    fn empty_collection_has_one_page() {
        let window = Paginator::new(0, POSTS_PER_PAGE).get_page(Some("5"));

        assert_eq!(window.number, 1);
        assert_eq!(window.num_pages, 1);
        assert_eq!(window.offset, 0);
    }
}
