//! B-tree node types and slotted-page serialization.
//!
//! A node occupies exactly one page. Fixed-size header fields and the offset
//! table grow from the left of the buffer, variable-size cells grow from the
//! right:
//!
//! ```text
//! +------+-------+----------------------------------+-------+ ... +-----------------+---+
//! | leaf | count | [child u64] offset u16  (x count) | [last |     | cells, filled   | . |
//! | u8   | u16   |                                  | child]|     | right-to-left   |   |
//! +------+-------+----------------------------------+-------+ ... +-----------------+---+
//! ```
//!
//! - `leaf`: 1 for a leaf, 0 for an internal node.
//! - `count`: number of items, little-endian.
//! - Child page numbers (8 bytes each) are present only for internal nodes;
//!   the rightmost child follows the offset table.
//! - Each cell is `[key_len u8][key][value_len u8][value]`. The first cell
//!   ends one byte before the end of the page; the final byte is unused.
//!
//! Lengths are single bytes, so keys and values are capped at 255 bytes.

use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_NUM_SIZE, Page, PageNumber};

/// Largest key a cell can hold.
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// Largest value a cell can hold.
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;

/// Leaf flag plus item count.
pub const NODE_HEADER_SIZE: usize = 3;

/// Size of a cell offset in the offset table.
const OFFSET_SIZE: usize = 2;

/// The last byte of a node page is never written.
const TRAILING_GAP: usize = 1;

const LEAF_FLAG: u8 = 1;
const INTERNAL_FLAG: u8 = 0;

/// A key-value pair stored in a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Item {
    /// Create an item, rejecting keys or values that do not fit a cell.
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Result<Self, StorageError> {
        if key.len() > MAX_KEY_LEN || value.len() > MAX_VALUE_LEN {
            return Err(StorageError::OversizedItem {
                key_len: key.len(),
                value_len: value.len(),
            });
        }
        Ok(Self { key, value })
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Bytes the item occupies as a cell.
    fn cell_len(&self) -> usize {
        2 + self.key.len() + self.value.len()
    }
}

/// An in-memory B-tree node.
///
/// Children are referenced by page number only and loaded on demand through
/// the store. A node is a leaf iff `child_pages` is empty; an internal node
/// has `items.len() + 1` children, where child `i` holds keys below
/// `items[i]` and child `i + 1` holds keys at or above it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Page the node lives on; `None` until its first write.
    pub page_number: Option<PageNumber>,
    /// Items sorted ascending by key, no duplicates.
    pub items: Vec<Item>,
    pub child_pages: Vec<PageNumber>,
}

impl Node {
    /// A node that has not been written yet.
    #[must_use]
    pub const fn new(items: Vec<Item>, child_pages: Vec<PageNumber>) -> Self {
        Self {
            page_number: None,
            items,
            child_pages,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.child_pages.is_empty()
    }

    /// Size charged to item `i` by the fill-factor policy.
    ///
    /// A page-number slot is counted for every item, leaf or internal.
    #[must_use]
    pub fn element_size(&self, i: usize) -> usize {
        let item = &self.items[i];
        item.key.len() + item.value.len() + PAGE_NUM_SIZE
    }

    /// Serialized size used for fill-factor decisions: header, every element,
    /// and one trailing page-number slot.
    #[must_use]
    pub fn node_size(&self) -> usize {
        let elements: usize = (0..self.items.len()).map(|i| self.element_size(i)).sum();
        NODE_HEADER_SIZE + elements + PAGE_NUM_SIZE
    }

    /// Exact number of page bytes the encoding occupies, including the unused
    /// final byte.
    ///
    /// For internal nodes with small items this exceeds `node_size`, since
    /// every item also carries an offset and two length bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let child_slots = if self.is_leaf() {
            0
        } else {
            self.items.len() + 1
        };
        let cells: usize = self.items.iter().map(Item::cell_len).sum();
        NODE_HEADER_SIZE
            + self.items.len() * OFFSET_SIZE
            + child_slots * PAGE_NUM_SIZE
            + cells
            + TRAILING_GAP
    }

    /// Locate `key` among the items with a linear scan.
    ///
    /// `Ok(i)` if `items[i]` has the key. Otherwise `Err(i)` with `i` the first
    /// index whose key is greater (or `items.len()`), which is both the
    /// insertion point and the child to descend into.
    pub fn find_key_in_node(&self, key: &[u8]) -> Result<usize, usize> {
        for (i, item) in self.items.iter().enumerate() {
            match item.key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(i),
                std::cmp::Ordering::Greater => return Err(i),
                std::cmp::Ordering::Less => {}
            }
        }
        Err(self.items.len())
    }

    /// Encode the node into a zeroed page.
    ///
    /// Nothing is written unless the whole node fits.
    #[allow(clippy::cast_possible_truncation)] // lengths and offsets are bounds-checked first
    pub fn serialize(&self, page: &mut Page) -> Result<(), StorageError> {
        for item in &self.items {
            if item.key.len() > MAX_KEY_LEN || item.value.len() > MAX_VALUE_LEN {
                return Err(StorageError::OversizedItem {
                    key_len: item.key.len(),
                    value_len: item.value.len(),
                });
            }
        }

        let is_leaf = self.is_leaf();
        if !is_leaf && self.child_pages.len() != self.items.len() + 1 {
            return Err(StorageError::Decode(format!(
                "internal node has {} children for {} items",
                self.child_pages.len(),
                self.items.len()
            )));
        }

        let count = u16::try_from(self.items.len()).map_err(|_| {
            StorageError::CapacityExceeded(format!("{} items in one node", self.items.len()))
        })?;

        let encoded = self.encoded_len();
        if encoded > page.len() {
            return Err(StorageError::CapacityExceeded(format!(
                "node needs {encoded} bytes, page is {}",
                page.len()
            )));
        }

        let mut left = 0;
        let mut right = page.len() - TRAILING_GAP;

        page.write_bytes(left, &[if is_leaf { LEAF_FLAG } else { INTERNAL_FLAG }]);
        left += 1;
        page.write_u16(left, count);
        left += 2;

        for (i, item) in self.items.iter().enumerate() {
            if !is_leaf {
                page.write_u64(left, self.child_pages[i]);
                left += PAGE_NUM_SIZE;
            }

            right -= item.cell_len();
            // Offsets stay below the page size, and MAX_PAGE_SIZE fits u16.
            page.write_u16(left, right as u16);
            left += OFFSET_SIZE;

            let mut pos = right;
            page.write_bytes(pos, &[item.key.len() as u8]);
            pos += 1;
            page.write_bytes(pos, &item.key);
            pos += item.key.len();
            page.write_bytes(pos, &[item.value.len() as u8]);
            pos += 1;
            page.write_bytes(pos, &item.value);
        }

        if let (false, Some(&last)) = (is_leaf, self.child_pages.last()) {
            page.write_u64(left, last);
        }

        Ok(())
    }

    /// Decode a node from a page. The node takes the page's number.
    pub fn deserialize(page: &Page) -> Result<Self, StorageError> {
        let buf = page.as_bytes();

        let header = slice_at(buf, 0, NODE_HEADER_SIZE)?;
        let is_leaf = match header[0] {
            LEAF_FLAG => true,
            INTERNAL_FLAG => false,
            other => {
                return Err(StorageError::Decode(format!(
                    "page {}: invalid leaf flag {other}",
                    page.number()
                )));
            }
        };
        let count = usize::from(u16::from_le_bytes([header[1], header[2]]));

        let mut items = Vec::with_capacity(count);
        let mut child_pages = Vec::with_capacity(if is_leaf { 0 } else { count + 1 });
        let mut left = NODE_HEADER_SIZE;

        for _ in 0..count {
            if !is_leaf {
                child_pages.push(read_u64_at(buf, left)?);
                left += PAGE_NUM_SIZE;
            }

            let offset_bytes = slice_at(buf, left, OFFSET_SIZE)?;
            let mut pos = usize::from(u16::from_le_bytes([offset_bytes[0], offset_bytes[1]]));
            left += OFFSET_SIZE;

            let key_len = usize::from(slice_at(buf, pos, 1)?[0]);
            pos += 1;
            let key = slice_at(buf, pos, key_len)?.to_vec();
            pos += key_len;

            let value_len = usize::from(slice_at(buf, pos, 1)?[0]);
            pos += 1;
            let value = slice_at(buf, pos, value_len)?.to_vec();

            items.push(Item { key, value });
        }

        if !is_leaf {
            child_pages.push(read_u64_at(buf, left)?);
        }

        Ok(Self {
            page_number: Some(page.number()),
            items,
            child_pages,
        })
    }
}

/// Bounds-checked view of `len` bytes at `pos`.
fn slice_at(buf: &[u8], pos: usize, len: usize) -> Result<&[u8], StorageError> {
    pos.checked_add(len)
        .and_then(|end| buf.get(pos..end))
        .ok_or_else(|| {
            StorageError::Decode(format!(
                "{len} bytes at offset {pos} run past the {}-byte page",
                buf.len()
            ))
        })
}

fn read_u64_at(buf: &[u8], pos: usize) -> Result<u64, StorageError> {
    let mut bytes = [0u8; PAGE_NUM_SIZE];
    bytes.copy_from_slice(slice_at(buf, pos, PAGE_NUM_SIZE)?);
    Ok(u64::from_le_bytes(bytes))
}
