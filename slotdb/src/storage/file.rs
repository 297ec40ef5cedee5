//! Database file I/O operations.
//!
//! This module maps page numbers to byte offsets (`page_number * page_size`)
//! and moves whole pages between memory and the backing file. It knows
//! nothing about what a page contains.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::storage::error::StorageError;
use crate::storage::page::{Page, PageNumber};

/// A page-addressed file handle.
///
/// Reads are positional and take `&self`, so any number of readers holding a
/// shared lock can fetch pages at once without racing on a file cursor.
#[derive(Debug)]
pub struct PageFile {
    file: Option<File>,
    page_size: usize,
}

impl PageFile {
    /// Create a new, empty page file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, page_size: usize) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file: Some(file),
            page_size,
        })
    }

    /// Open an existing page file.
    ///
    /// The page size is not recorded in the file, so a file reopened with a
    /// different page size is unsupported. The only mismatch that can be
    /// detected is a file length that is not a whole number of pages.
    pub fn open(path: &Path, page_size: usize) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(StorageError::Decode(format!(
                "file length {len} is not a multiple of the page size {page_size}"
            )));
        }

        Ok(Self {
            file: Some(file),
            page_size,
        })
    }

    /// Page size in bytes.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether `close` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// A zeroed buffer of the right size, addressed at `number`.
    #[must_use]
    pub fn allocate_empty_page(&self, number: PageNumber) -> Page {
        Page::new(number, self.page_size)
    }

    /// Read a whole page from the file.
    ///
    /// Fails with an I/O error if the file is shorter than the page's end.
    pub fn read_page(&self, number: PageNumber) -> Result<Page, StorageError> {
        let file = self.handle()?;
        let offset = self.offset_of(number)?;

        let mut page = self.allocate_empty_page(number);
        read_exact_at(file, page.as_bytes_mut(), offset)?;

        Ok(page)
    }

    /// Write a whole page to the file.
    pub fn write_page(&mut self, page: &Page) -> Result<(), StorageError> {
        if page.len() != self.page_size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "page buffer is {} bytes, expected {}",
                    page.len(),
                    self.page_size
                ),
            )));
        }

        let offset = self.offset_of(page.number())?;
        let file = self.handle()?;
        write_all_at(file, page.as_bytes(), offset)?;

        Ok(())
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.handle()?.sync_all().map_err(StorageError::Io)
    }

    /// Sync and release the file handle.
    ///
    /// Calling `close` on an already closed file does nothing.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn handle(&self) -> Result<&File, StorageError> {
        self.file.as_ref().ok_or(StorageError::Closed)
    }

    fn offset_of(&self, number: PageNumber) -> Result<u64, StorageError> {
        number
            .checked_mul(self.page_size as u64)
            .ok_or_else(|| StorageError::Decode(format!("page number {number} out of range")))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole page",
                ));
            }
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole page",
                ));
            }
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::FALLBACK_PAGE_SIZE;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_create_already_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        fs::write(&path, b"existing").expect("write file");

        let result = PageFile::create(&path, FALLBACK_PAGE_SIZE);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let mut file = PageFile::create(&path, FALLBACK_PAGE_SIZE).expect("create");

        let mut page = file.allocate_empty_page(3);
        page.write_bytes(0, b"hello world");
        file.write_page(&page).expect("write page");

        let read = file.read_page(3).expect("read page");
        assert_eq!(read.number(), 3);
        assert_eq!(read.read_bytes(0, 11), b"hello world");

        // Writing page 3 grows the file to four whole pages.
        let len = fs::metadata(&path).expect("metadata").len();
        assert_eq!(len, 4 * FALLBACK_PAGE_SIZE as u64);
    }

    #[test]
    fn test_read_past_end_is_io_error() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let file = PageFile::create(&path, FALLBACK_PAGE_SIZE).expect("create");
        let result = file.read_page(100);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_huge_page_number_is_rejected() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let file = PageFile::create(&path, FALLBACK_PAGE_SIZE).expect("create");
        let result = file.read_page(u64::MAX);
        assert!(matches!(result, Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_wrong_sized_buffer_is_rejected() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let mut file = PageFile::create(&path, FALLBACK_PAGE_SIZE).expect("create");
        let page = Page::new(1, 512);
        assert!(file.write_page(&page).is_err());
    }

    #[test]
    fn test_page_data_persistence() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        {
            let mut file = PageFile::create(&path, FALLBACK_PAGE_SIZE).expect("create");
            let mut page = file.allocate_empty_page(1);
            page.write_u64(100, 0xDEAD_BEEF_CAFE_BABE);
            file.write_page(&page).expect("write");
            file.close().expect("close");
        }

        {
            let file = PageFile::open(&path, FALLBACK_PAGE_SIZE).expect("open");
            let page = file.read_page(1).expect("read");
            assert_eq!(page.read_u64(100), 0xDEAD_BEEF_CAFE_BABE);
        }
    }

    #[test]
    fn test_open_rejects_partial_page_length() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        fs::write(&path, vec![0u8; FALLBACK_PAGE_SIZE + 100]).expect("write file");

        let result = PageFile::open(&path, FALLBACK_PAGE_SIZE);
        assert!(matches!(result, Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.db");

        let mut file = PageFile::create(&path, FALLBACK_PAGE_SIZE).expect("create");
        file.close().expect("first close");
        file.close().expect("second close");
        assert!(file.is_closed());

        assert!(matches!(file.read_page(0), Err(StorageError::Closed)));
        assert!(matches!(file.sync(), Err(StorageError::Closed)));
    }
}
