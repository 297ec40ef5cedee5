//! Single-file page storage engine.
//!
//! # File Format
//!
//! The database is one file of fixed-size pages (4KB by default):
//!
//! - Page 0: meta record (tree root and allocator page)
//! - Page 1 on a fresh file: free-page allocator
//! - Remaining pages: B-tree nodes, one per page
//!
//! All integers are little-endian. The page size is not stored in the file;
//! a file must be reopened with the size it was created with.
//!
//! # Usage
//!
//! ```no_run
//! use slotdb::config::Options;
//! use slotdb::storage::{Node, Store, StorageError};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), StorageError> {
//! let mut store = Store::open(Path::new("example.db"), &Options::default())?;
//!
//! let mut root = Node::default();
//! let page = store.write_node(&mut root)?;
//! store.set_root(page);
//!
//! store.write_freelist()?;
//! store.write_meta()?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod btree;
mod error;
mod file;
mod freelist;
mod meta;
mod page;
mod store;

pub use btree::{Item, KeyLocation, MAX_KEY_LEN, MAX_VALUE_LEN, MAX_TREE_DEPTH, Node};
pub use error::StorageError;
pub use file::PageFile;
pub use freelist::{Freelist, released_capacity};
pub use meta::{META_SIZE, Meta};
pub use page::{
    FALLBACK_PAGE_SIZE, MAX_PAGE_SIZE, META_PAGE_NUM, MIN_PAGE_SIZE, PAGE_NUM_SIZE, Page,
    PageNumber, default_page_size,
};
pub use store::Store;
