//! Shared test helpers.

use std::collections::HashSet;

use tempfile::TempDir;

use crate::config::Options;
use crate::db::Db;
use crate::storage::{FALLBACK_PAGE_SIZE, Node, PageNumber, Store};

/// Fixed-width test key, so numeric order matches byte order.
pub fn key(i: usize) -> Vec<u8> {
    format!("key-{i:06}").into_bytes()
}

/// Default options with the page size pinned, so size arithmetic in tests
/// does not depend on the host.
pub fn fixed_options() -> Options {
    Options {
        page_size: FALLBACK_PAGE_SIZE,
        ..Options::default()
    }
}

/// Open a fresh database with [`fixed_options`] in a temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped, so keep
/// it alive for as long as the database is used.
pub fn open_db() -> (TempDir, Db) {
    open_db_with(fixed_options())
}

pub fn open_db_with(options: Options) -> (TempDir, Db) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db = Db::open(&dir.path().join("test.db"), options).expect("open db");
    (dir, db)
}

/// What `check_tree` saw.
#[derive(Debug)]
pub struct TreeStats {
    /// Every key in order.
    pub keys: Vec<Vec<u8>>,
    /// Levels below the root; 0 for a leaf root or an empty tree.
    pub depth: usize,
}

/// Walk the whole tree and panic on the first broken invariant.
///
/// Checks that keys are strictly increasing in order and respect their
/// separators, that internal nodes have one more child than items, that
/// every node fits in a page and stays under the max threshold, that all
/// leaves are at the same depth, and
/// that every page below the allocator's high-water mark is either in use
/// or released exactly once.
pub fn check_tree(store: &Store) -> TreeStats {
    let mut walk = Walk {
        store,
        keys: Vec::new(),
        leaf_depth: None,
        pages: HashSet::new(),
    };

    if store.root() != 0 {
        walk.visit(store.root(), 0, None, None);
    }

    let mut used = walk.pages.clone();
    assert!(used.insert(0), "meta page is used as a node");
    assert!(
        used.insert(store.meta().freelist_page),
        "allocator page is used as a node"
    );
    for &page in store.freelist().released() {
        assert!(used.insert(page), "page {page} is released but still in use");
    }
    for page in 0..store.freelist().next_unused() {
        assert!(used.contains(&page), "page {page} leaked");
    }
    assert_eq!(
        used.len() as u64,
        store.freelist().next_unused(),
        "pages past the high-water mark are in use"
    );

    TreeStats {
        keys: walk.keys,
        depth: walk.leaf_depth.unwrap_or(0),
    }
}

struct Walk<'a> {
    store: &'a Store,
    keys: Vec<Vec<u8>>,
    leaf_depth: Option<usize>,
    pages: HashSet<PageNumber>,
}

impl Walk<'_> {
    fn visit(&mut self, page: PageNumber, depth: usize, lower: Option<&[u8]>, upper: Option<&[u8]>) {
        assert!(self.pages.insert(page), "page {page} reachable twice");
        let node: Node = self.store.get_node(page).expect("read node");

        assert!(
            node.encoded_len() <= self.store.page_size(),
            "page {page} does not fit"
        );
        assert!(
            !self.store.is_over_populated(&node),
            "page {page}: node size {} over the max threshold",
            node.node_size()
        );
        for item in &node.items {
            if let Some(lower) = lower {
                assert!(item.key() > lower, "page {page}: key below separator");
            }
            if let Some(upper) = upper {
                assert!(item.key() < upper, "page {page}: key above separator");
            }
        }

        if node.is_leaf() {
            match self.leaf_depth {
                Some(expected) => assert_eq!(depth, expected, "page {page}: leaf depth"),
                None => self.leaf_depth = Some(depth),
            }
            for item in &node.items {
                self.push_key(item.key());
            }
            return;
        }

        assert_eq!(
            node.child_pages.len(),
            node.items.len() + 1,
            "page {page}: child count"
        );
        for (i, &child) in node.child_pages.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(node.items[i - 1].key()) };
            let child_upper = node.items.get(i).map_or(upper, |item| Some(item.key()));
            self.visit(child, depth + 1, child_lower, child_upper);
            if let Some(item) = node.items.get(i) {
                self.push_key(item.key());
            }
        }
    }

    fn push_key(&mut self, key: &[u8]) {
        if let Some(previous) = self.keys.last() {
            assert!(previous.as_slice() < key, "keys out of order");
        }
        self.keys.push(key.to_vec());
    }
}
