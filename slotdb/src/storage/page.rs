//! Page types and constants for the storage engine.
//!
//! A page is the unit of I/O: a page number plus a buffer of exactly
//! `page_size` bytes. The page size is chosen when a file is created and never
//! changes for the lifetime of that file.

/// Page size used when the platform reports one outside the accepted range.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Smallest page size accepted by the engine.
///
/// Large enough for the meta record, an allocator page with a useful number
/// of released slots, and a node holding a couple of maximum-size items.
pub const MIN_PAGE_SIZE: usize = 1024;

/// Largest page size accepted by the engine.
///
/// Cell offsets inside a node page are stored as `u16`.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Size of an encoded page number in bytes.
pub const PAGE_NUM_SIZE: usize = 8;

/// The platform memory page size, the default for new files.
///
/// Falls back to [`FALLBACK_PAGE_SIZE`] when the OS value is outside
/// `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`.
#[must_use]
pub fn default_page_size() -> usize {
    let size = page_size::get();
    if (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&size) {
        size
    } else {
        FALLBACK_PAGE_SIZE
    }
}

/// A logical page identifier. `page_number * page_size` is the file offset.
pub type PageNumber = u64;

/// Page 0 always holds the meta record.
pub const META_PAGE_NUM: PageNumber = 0;

/// A raw page buffer tagged with the page number it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    number: PageNumber,
    data: Box<[u8]>,
}

impl Page {
    /// Create a zeroed page of `page_size` bytes.
    #[must_use]
    pub fn new(number: PageNumber, page_size: usize) -> Self {
        Self {
            number,
            data: vec![0u8; page_size].into_boxed_slice(),
        }
    }

    /// The page number this buffer is read from or written to.
    #[must_use]
    pub const fn number(&self) -> PageNumber {
        self.number
    }

    /// Retarget the page at another page number.
    pub const fn set_number(&mut self, number: PageNumber) {
        self.number = number;
    }

    /// Page size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Pages are never empty; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable access to the raw page data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Read a u16 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write a u16 (little-endian) at the given offset.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a u64 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    }

    /// Write a u64 (little-endian) at the given offset.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = self.data.len().min(16);
        f.debug_struct("Page")
            .field("number", &self.number)
            .field("len", &self.data.len())
            .field("first_16_bytes", &&self.data[..head])
            .finish_non_exhaustive()
    }
}
