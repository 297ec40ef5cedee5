//! Meta record structure and serialization.
//!
//! The meta record occupies page 0 and anchors the file: it says where the
//! B-tree root and the free-page allocator live. Every other component learns
//! these values through the store.

use crate::storage::page::{PAGE_NUM_SIZE, Page, PageNumber};

/// Meta field offsets. The rest of the page is zero padding.
mod offsets {
    pub const ROOT: usize = 0;
    pub const FREELIST_PAGE: usize = 8;
}

/// Bytes of page 0 used by the meta record.
pub const META_SIZE: usize = 2 * PAGE_NUM_SIZE;

/// Location of the tree root and the allocator page.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Root page of the B-tree, or 0 while the tree is empty.
    pub root: PageNumber,
    /// Page holding the serialized free-page allocator.
    pub freelist_page: PageNumber,
}

impl Meta {
    /// An empty meta record for a fresh file.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: 0,
            freelist_page: 0,
        }
    }

    /// Serialize into the start of the page. Bytes past the record are left
    /// untouched, so callers pass a zeroed page.
    pub fn serialize(&self, page: &mut Page) {
        page.write_u64(offsets::ROOT, self.root);
        page.write_u64(offsets::FREELIST_PAGE, self.freelist_page);
    }

    /// Deserialize from a page.
    ///
    /// Values are not validated; a corrupted meta page yields page numbers
    /// that fail later when they are read.
    #[must_use]
    pub fn deserialize(page: &Page) -> Self {
        Self {
            root: page.read_u64(offsets::ROOT),
            freelist_page: page.read_u64(offsets::FREELIST_PAGE),
        }
    }
}
