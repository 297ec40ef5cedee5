//! Free-page allocator.
//!
//! Tracks a high-water mark plus a stack of released page numbers. Released
//! pages are handed out again (most recent first) before the file grows.
//!
//! # Page layout (little-endian)
//!
//! ```text
//! +------------------+----------------------+-----------------------------+
//! | next_unused: u64 | released_count: u16  | released_count x page: u64  |
//! +------------------+----------------------+-----------------------------+
//! ```
//!
//! One allocator page can therefore track at most
//! `(page_size - HEADER_SIZE) / 8` released pages. This is a hard limit of the
//! format: serializing more fails with `CapacityExceeded`.

use crate::storage::error::StorageError;
use crate::storage::page::{META_PAGE_NUM, PAGE_NUM_SIZE, Page, PageNumber};

/// Bytes before the released page list.
const HEADER_SIZE: usize = PAGE_NUM_SIZE + 2;

/// Maximum number of released pages one allocator page of `page_size` bytes
/// can hold.
#[must_use]
pub const fn released_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(HEADER_SIZE) / PAGE_NUM_SIZE
}

/// Free-page allocator state.
///
/// Every page number below `next_unused` is either in use (meta, allocator or
/// a live node) or present exactly once in `released`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freelist {
    next_unused: PageNumber,
    released: Vec<PageNumber>,
}

impl Freelist {
    /// Allocator for a fresh file. Page 0 is already taken by the meta record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_unused: META_PAGE_NUM + 1,
            released: Vec::new(),
        }
    }

    /// Hand out a page number.
    ///
    /// Reuses the most recently released page if there is one, otherwise
    /// returns the high-water mark and advances it.
    pub fn next_page(&mut self) -> PageNumber {
        if let Some(page) = self.released.pop() {
            return page;
        }
        let page = self.next_unused;
        self.next_unused += 1;
        page
    }

    /// Mark a page number as reusable.
    ///
    /// Not validated: releasing a page twice, or one still in use, is a
    /// caller bug.
    pub fn release(&mut self, page: PageNumber) {
        self.released.push(page);
    }

    /// The next never-used page number.
    #[must_use]
    pub const fn next_unused(&self) -> PageNumber {
        self.next_unused
    }

    /// Released page numbers, oldest first.
    #[must_use]
    pub fn released(&self) -> &[PageNumber] {
        &self.released
    }

    /// Serialize into a page.
    pub fn serialize(&self, page: &mut Page) -> Result<(), StorageError> {
        let capacity = released_capacity(page.len());
        let count = self.released.len();
        if count > capacity {
            return Err(StorageError::CapacityExceeded(format!(
                "{count} released pages, allocator page holds at most {capacity}"
            )));
        }
        let count_u16 = u16::try_from(count).map_err(|_| {
            StorageError::CapacityExceeded(format!("{count} released pages exceed u16 count"))
        })?;

        page.write_u64(0, self.next_unused);
        page.write_u16(PAGE_NUM_SIZE, count_u16);

        let mut pos = HEADER_SIZE;
        for &released in &self.released {
            page.write_u64(pos, released);
            pos += PAGE_NUM_SIZE;
        }

        Ok(())
    }

    /// Deserialize from a page.
    pub fn deserialize(page: &Page) -> Result<Self, StorageError> {
        if page.len() < HEADER_SIZE {
            return Err(StorageError::Decode(format!(
                "allocator page is {} bytes, header needs {HEADER_SIZE}",
                page.len()
            )));
        }

        let next_unused = page.read_u64(0);
        let count = usize::from(page.read_u16(PAGE_NUM_SIZE));

        let capacity = released_capacity(page.len());
        if count > capacity {
            return Err(StorageError::Decode(format!(
                "allocator page claims {count} released pages, page holds at most {capacity}"
            )));
        }

        let released = (0..count)
            .map(|i| page.read_u64(HEADER_SIZE + i * PAGE_NUM_SIZE))
            .collect();

        Ok(Self {
            next_unused,
            released,
        })
    }
}

impl Default for Freelist {
    fn default() -> Self {
        Self::new()
    }
}
