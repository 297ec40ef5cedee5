//! Storage engine facade.
//!
//! `Store` composes the page file, the meta record and the free-page
//! allocator, and turns pages into nodes. It owns all of them: the allocator
//! and meta are plain fields, never shared state.
//!
//! Node writes never persist the meta record or the allocator. Callers decide
//! when to call [`Store::write_freelist`] and [`Store::write_meta`].

use std::path::Path;

use tracing::{debug, info};

use crate::config::Options;
use crate::storage::btree::{Item, NODE_HEADER_SIZE, Node};
use crate::storage::error::StorageError;
use crate::storage::file::PageFile;
use crate::storage::freelist::Freelist;
use crate::storage::meta::Meta;
use crate::storage::page::{META_PAGE_NUM, PageNumber};

/// An open database file.
#[derive(Debug)]
pub struct Store {
    file: PageFile,
    meta: Meta,
    freelist: Freelist,
    min_fill_percent: f32,
    max_fill_percent: f32,
}

impl Store {
    /// Open the file at `path`, creating and initializing it if it does not
    /// exist.
    ///
    /// Options are validated before the file is touched.
    pub fn open(path: &Path, options: &Options) -> Result<Self, StorageError> {
        options.validate().map_err(StorageError::InvalidOptions)?;
        if path.exists() {
            Self::open_existing(path, options)
        } else {
            Self::create(path, options)
        }
    }

    fn create(path: &Path, options: &Options) -> Result<Self, StorageError> {
        let file = PageFile::create(path, options.page_size)?;

        let mut freelist = Freelist::new();
        let mut meta = Meta::new();
        meta.freelist_page = freelist.next_page();

        let mut store = Self {
            file,
            meta,
            freelist,
            min_fill_percent: options.min_fill_percent,
            max_fill_percent: options.max_fill_percent,
        };
        store.write_freelist()?;
        store.write_meta()?;

        info!(path = %path.display(), page_size = options.page_size, "created database file");
        Ok(store)
    }

    fn open_existing(path: &Path, options: &Options) -> Result<Self, StorageError> {
        let file = PageFile::open(path, options.page_size)?;

        let meta = Meta::deserialize(&file.read_page(META_PAGE_NUM)?);
        let freelist = Freelist::deserialize(&file.read_page(meta.freelist_page)?)?;

        info!(
            path = %path.display(),
            root = meta.root,
            next_unused = freelist.next_unused(),
            "opened database file"
        );
        Ok(Self {
            file,
            meta,
            freelist,
            min_fill_percent: options.min_fill_percent,
            max_fill_percent: options.max_fill_percent,
        })
    }

    /// Sync and release the file. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if !self.file.is_closed() {
            self.file.close()?;
            info!("closed database file");
        }
        Ok(())
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.file.is_closed()
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.file.page_size()
    }

    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }

    #[must_use]
    pub const fn freelist(&self) -> &Freelist {
        &self.freelist
    }

    /// Root page of the tree, or 0 while the tree is empty.
    #[must_use]
    pub const fn root(&self) -> PageNumber {
        self.meta.root
    }

    /// Change the in-memory root. Persisted by the next `write_meta`.
    pub const fn set_root(&mut self, root: PageNumber) {
        self.meta.root = root;
    }

    /// Write the meta record to page 0.
    pub fn write_meta(&mut self) -> Result<(), StorageError> {
        let mut page = self.file.allocate_empty_page(META_PAGE_NUM);
        self.meta.serialize(&mut page);
        self.file.write_page(&page)
    }

    /// Write the allocator state to its page.
    pub fn write_freelist(&mut self) -> Result<(), StorageError> {
        let mut page = self.file.allocate_empty_page(self.meta.freelist_page);
        self.freelist.serialize(&mut page)?;
        self.file.write_page(&page)
    }

    /// Flush everything written so far to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.file.sync()
    }

    /// Read and decode the node stored at `page_number`.
    pub fn get_node(&self, page_number: PageNumber) -> Result<Node, StorageError> {
        let page = self.file.read_page(page_number)?;
        Node::deserialize(&page)
    }

    /// Encode and write a node, allocating its page on first write.
    ///
    /// The node is encoded before a page is allocated, so a node that does
    /// not fit fails without consuming a page number.
    pub fn write_node(&mut self, node: &mut Node) -> Result<PageNumber, StorageError> {
        let mut page = self.file.allocate_empty_page(node.page_number.unwrap_or(0));
        node.serialize(&mut page)?;

        let page_number = match node.page_number {
            Some(number) => number,
            None => {
                let number = self.freelist.next_page();
                node.page_number = Some(number);
                page.set_number(number);
                number
            }
        };

        self.file.write_page(&page)?;
        Ok(page_number)
    }

    /// Give `node` a page number without writing it. A node that already has
    /// one keeps it.
    pub fn assign_page(&mut self, node: &mut Node) -> PageNumber {
        match node.page_number {
            Some(number) => number,
            None => {
                let number = self.freelist.next_page();
                node.page_number = Some(number);
                number
            }
        }
    }

    /// Release a node's page for reuse. The bytes stay on disk.
    pub fn delete_node(&mut self, page_number: PageNumber) {
        debug!(page = page_number, "released node page");
        self.freelist.release(page_number);
    }

    /// A node that has no page yet; `write_node` assigns one.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn new_node(&self, items: Vec<Item>, child_pages: Vec<PageNumber>) -> Node {
        Node::new(items, child_pages)
    }

    /// Node size above which a node must split.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn max_threshold(&self) -> f32 {
        self.max_fill_percent * self.page_size() as f32
    }

    /// Node size below which a node needs rebalancing.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn min_threshold(&self) -> f32 {
        self.min_fill_percent * self.page_size() as f32
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_over_populated(&self, node: &Node) -> bool {
        node.node_size() as f32 > self.max_threshold()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_under_populated(&self, node: &Node) -> bool {
        (node.node_size() as f32) < self.min_threshold()
    }

    /// Whether a node has to split before it can be written.
    ///
    /// Internal nodes carry more per-item overhead than `node_size` counts,
    /// so the exact encoded length is checked as well.
    #[must_use]
    pub fn needs_split(&self, node: &Node) -> bool {
        self.is_over_populated(node) || node.encoded_len() > self.page_size()
    }

    /// Index of the item to promote when splitting `node`.
    ///
    /// Accumulates element sizes after the header and returns `i + 1` for the
    /// first item `i` at which the total exceeds the min threshold, unless
    /// `i` is the last item. `None` means the node has no split point, which
    /// during rebalancing also means it has nothing to lend.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn split_index(&self, node: &Node) -> Option<usize> {
        let threshold = self.min_threshold();
        let last = node.items.len().checked_sub(1)?;

        let mut size = NODE_HEADER_SIZE;
        for i in 0..node.items.len() {
            size += node.element_size(i);
            if size as f32 > threshold && i < last {
                return Some(i + 1);
            }
        }
        None
    }

    /// Where to divide an over-full node.
    ///
    /// Uses [`Store::split_index`] when it finds a point. A node that outgrew
    /// its page while still under the min threshold has none, so it is cut at
    /// the first item past half of its element bytes instead. `None` only for
    /// nodes with fewer than two items.
    #[must_use]
    pub fn split_point(&self, node: &Node) -> Option<usize> {
        let last = node.items.len().checked_sub(1).filter(|&last| last > 0)?;
        if let Some(index) = self.split_index(node) {
            return Some(index);
        }

        let total: usize = (0..node.items.len()).map(|i| node.element_size(i)).sum();
        let mut size = 0;
        for i in 0..node.items.len() {
            size += node.element_size(i);
            if size * 2 > total {
                return Some(i.clamp(1, last));
            }
        }
        Some(last)
    }

    /// Whether `node` needs splitting and can be split.
    #[must_use]
    pub fn can_split(&self, node: &Node) -> bool {
        self.needs_split(node) && self.split_point(node).is_some()
    }
}
