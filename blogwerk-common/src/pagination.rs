//! Page-number pagination shared by every feed.
//!
//! Pages are addressed by a 1-based number. Out-of-range numbers are clamped
//! onto the first or last page instead of failing, and an empty sequence still
//! has one (empty) page.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

pub const DEFAULT_PER_PAGE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Paginator {
    per_page: NonZeroUsize,
}

/// One slice of an ordered sequence plus the metadata needed to navigate it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub total_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

impl Paginator {
    #[must_use]
    pub fn new(per_page: NonZeroUsize) -> Self {
        Self { per_page }
    }

    #[must_use]
    pub fn per_page(self) -> NonZeroUsize {
        self.per_page
    }

    #[must_use]
    pub fn total_pages(self, count: usize) -> usize {
        count.div_ceil(self.per_page.get()).max(1)
    }

    #[must_use]
    pub fn paginate<T>(self, items: Vec<T>, requested_page: i64) -> Page<T> {
        let count = items.len();
        let total_pages = self.total_pages(count);
        let number = usize::try_from(requested_page)
            .unwrap_or(1)
            .clamp(1, total_pages);

        let per_page = self.per_page.get();
        let items = items
            .into_iter()
            .skip((number - 1) * per_page)
            .take(per_page)
            .collect();

        Page {
            items,
            number,
            total_pages,
            count,
            has_next: number < total_pages,
            has_previous: number > 1,
        }
    }
}

impl<T> Page<T> {
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            total_pages: self.total_pages,
            count: self.count,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }

    #[must_use]
    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next.then_some(self.number + 1)
    }

    #[must_use]
    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous.then_some(self.number - 1)
    }
}

/// Reads the raw `page` query value. Anything that is not an integer means page 1.
#[must_use]
pub fn parse_page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|raw| raw.trim().parse().ok()).unwrap_or(1)
}
