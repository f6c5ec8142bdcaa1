//! Page arithmetic for the post listings.
//!
//! Listings are split into pages of [`PAGE_SIZE`] items numbered from 1.
//! [`Paginator::page_bounds`] is strict and yields nothing for pages that do
//! not exist, while [`Paginator::get_page`] resolves whatever the client sent
//! to a page that does.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

pub const PAGE_SIZE: NonZeroU64 = NonZeroU64::new(10).unwrap();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Paginator {
    count: u64,
    per_page: NonZeroU64,
}

/// The slice of a listing covered by one page.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PageBounds {
    pub offset: u64,
    pub limit: u64,
}

impl Paginator {
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self::with_page_size(count, PAGE_SIZE)
    }

    #[must_use]
    pub fn with_page_size(count: u64, per_page: NonZeroU64) -> Self {
        Self { count, per_page }
    }

    #[must_use]
    pub fn count(self) -> u64 {
        self.count
    }

    /// An empty listing still has one (empty) page.
    #[must_use]
    pub fn num_pages(self) -> u64 {
        if self.count == 0 {
            1
        } else {
            self.count.div_ceil(self.per_page.get())
        }
    }

    #[must_use]
    pub fn page_bounds(self, number: u64) -> PageBounds {
        if number == 0 || number > self.num_pages() {
            return PageBounds {
                offset: self.count,
                limit: 0,
            };
        }

        let offset = (number - 1) * self.per_page.get();
        PageBounds {
            offset,
            limit: self.per_page.get().min(self.count - offset),
        }
    }

    /// Resolves a raw `page` query value: missing or non-numeric values give
    /// the first page, numbers outside the listing give the last one.
    #[must_use]
    pub fn get_page(self, raw: Option<&str>) -> u64 {
        let Some(number) = raw.and_then(|raw| raw.trim().parse::<i64>().ok()) else {
            return 1;
        };

        match u64::try_from(number) {
            Ok(number @ 1..) if number <= self.num_pages() => number,
            _ => self.num_pages(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(paginator: Paginator, number: u64, items: Vec<T>) -> Self {
        let num_pages = paginator.num_pages();

        Self {
            items,
            number,
            num_pages,
            count: paginator.count(),
            has_previous: number > 1,
            has_next: number < num_pages,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
