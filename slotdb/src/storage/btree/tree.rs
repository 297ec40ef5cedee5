//! Descent and single-level split, implemented on the store.
//!
//! Nodes reference children by page number, so every step down the tree is a
//! page read through the store. The path taken is recorded as the child index
//! chosen at each level (the ancestor trail); callers that need to walk back
//! up reload the path with [`Store::load_path`].

use crate::storage::btree::node::{Item, Node};
use crate::storage::error::StorageError;
use crate::storage::store::Store;

/// Deepest descent accepted before the file is treated as corrupt.
pub const MAX_TREE_DEPTH: usize = 64;

/// Result of [`Store::find_key`].
#[derive(Debug, Clone)]
pub struct KeyLocation {
    /// Index of the key in `node` if found, otherwise its insertion point.
    pub index: usize,
    /// The node the search stopped at.
    pub node: Node,
    /// Child index taken at each level, from the starting node down.
    pub ancestors: Vec<usize>,
    /// Whether `node.items[index]` holds the key.
    pub found: bool,
}

impl Store {
    /// Search for `key` starting at `from`.
    ///
    /// Stops at the first node holding the key, which may be internal. On a
    /// miss the search ends at a leaf: with `exact` it fails with `NotFound`,
    /// otherwise it returns the insertion point.
    pub fn find_key(
        &self,
        from: Node,
        key: &[u8],
        exact: bool,
    ) -> Result<KeyLocation, StorageError> {
        let mut node = from;
        let mut ancestors = Vec::new();

        loop {
            match node.find_key_in_node(key) {
                Ok(index) => {
                    return Ok(KeyLocation {
                        index,
                        node,
                        ancestors,
                        found: true,
                    });
                }
                Err(index) if node.is_leaf() => {
                    if exact {
                        return Err(StorageError::NotFound);
                    }
                    return Ok(KeyLocation {
                        index,
                        node,
                        ancestors,
                        found: false,
                    });
                }
                Err(index) => {
                    if ancestors.len() >= MAX_TREE_DEPTH {
                        return Err(StorageError::Decode(format!(
                            "tree deeper than {MAX_TREE_DEPTH} levels"
                        )));
                    }
                    let child = child_page(&node, index)?;
                    ancestors.push(index);
                    node = self.get_node(child)?;
                }
            }
        }
    }

    /// Reload the nodes along an ancestor trail.
    ///
    /// Returns `from` followed by one node per trail entry, so the last node
    /// is the one the trail leads to.
    pub fn load_path(&self, from: Node, ancestors: &[usize]) -> Result<Vec<Node>, StorageError> {
        let mut path = Vec::with_capacity(ancestors.len() + 1);
        let mut node = from;
        for &index in ancestors {
            let child = child_page(&node, index)?;
            path.push(node);
            node = self.get_node(child)?;
        }
        path.push(node);
        Ok(path)
    }

    /// Split `child`, the `child_index`-th child of `parent`, and write the
    /// result.
    ///
    /// See [`Store::split_node`] for how the items are divided. New siblings
    /// are written before `child`, so the truncated child never reaches disk
    /// ahead of the pages holding its former items. Writing `parent` is up to
    /// the caller.
    pub fn split(
        &mut self,
        parent: &mut Node,
        child: &mut Node,
        child_index: usize,
    ) -> Result<(), StorageError> {
        let siblings = self.split_node(parent, child, child_index)?;
        for mut sibling in siblings {
            self.write_node(&mut sibling)?;
        }
        self.write_node(child)?;
        Ok(())
    }

    /// Divide `child`, the `child_index`-th child of `parent`, without
    /// writing anything.
    ///
    /// The item at [`Store::split_point`] moves up into
    /// `parent.items[child_index]`. Items after it, and for internal nodes the
    /// children after it, move to a new sibling linked at
    /// `parent.child_pages[child_index + 1]`. Either half that still needs
    /// splitting is divided again, so every piece fits and stays under the max
    /// threshold unless it is a single item.
    ///
    /// `child` keeps the leftmost piece and its page. The other pieces get
    /// fresh page numbers and are returned left to right, unwritten.
    pub fn split_node(
        &mut self,
        parent: &mut Node,
        child: &mut Node,
        child_index: usize,
    ) -> Result<Vec<Node>, StorageError> {
        let split_at = self.split_point(child).ok_or_else(|| {
            StorageError::CapacityExceeded(format!(
                "node with {} items has no split point",
                child.items.len()
            ))
        })?;

        let (promoted, right) = cut(child, split_at)?;
        let mut pending = vec![Part::Node(right), Part::Separator(promoted)];
        let left = std::mem::take(child);
        pending.push(Part::Node(left));

        let mut pieces = Vec::new();
        let mut separators = Vec::new();
        while let Some(part) = pending.pop() {
            let mut node = match part {
                Part::Separator(item) => {
                    separators.push(item);
                    continue;
                }
                Part::Node(node) => node,
            };
            if !self.needs_split(&node) {
                pieces.push(node);
                continue;
            }
            let Some(at) = self.split_point(&node) else {
                if node.encoded_len() > self.page_size() {
                    return Err(StorageError::CapacityExceeded(format!(
                        "single item of {} bytes does not fit a page",
                        node.encoded_len()
                    )));
                }
                pieces.push(node);
                continue;
            };
            let (promoted, right) = cut(&mut node, at)?;
            pending.push(Part::Node(right));
            pending.push(Part::Separator(promoted));
            pending.push(Part::Node(node));
        }

        let mut pieces = pieces.into_iter();
        *child = pieces
            .next()
            .ok_or_else(|| StorageError::Decode("split produced no pieces".to_string()))?;

        let mut siblings: Vec<Node> = pieces.collect();
        for (offset, (sibling, separator)) in siblings.iter_mut().zip(separators).enumerate() {
            let page = self.assign_page(sibling);
            parent.items.insert(child_index + offset, separator);
            parent.child_pages.insert(child_index + offset + 1, page);
        }
        Ok(siblings)
    }
}

/// Work list entry for [`Store::split_node`], consumed left to right.
enum Part {
    Node(Node),
    Separator(Item),
}

/// Cut `node` at `at`: the item there is returned along with a new node
/// holding everything after it.
fn cut(node: &mut Node, at: usize) -> Result<(Item, Node), StorageError> {
    let moved_items = node.items.split_off(at + 1);
    let moved_children = if node.is_leaf() {
        Vec::new()
    } else {
        node.child_pages.split_off(at + 1)
    };
    let Some(promoted) = node.items.pop() else {
        return Err(StorageError::Decode("split point past the last item".to_string()));
    };
    Ok((promoted, Node::new(moved_items, moved_children)))
}

fn child_page(node: &Node, index: usize) -> Result<u64, StorageError> {
    node.child_pages.get(index).copied().ok_or_else(|| {
        StorageError::Decode(format!(
            "child index {index} out of range for node with {} children",
            node.child_pages.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::testing::fixed_options;
    use tempfile::tempdir;

    fn item(key: &str, value_len: usize) -> Item {
        Item::new(key.as_bytes().to_vec(), vec![b'v'; value_len]).expect("item")
    }

    fn keyed(i: usize, value_len: usize) -> Item {
        item(&format!("key{i:07}"), value_len)
    }

    /// A two-level tree: root ["m"] over leaves ["c", "f"] and ["p", "t"].
    fn two_level(store: &mut Store) -> Node {
        let mut left = Node::new(vec![item("c", 1), item("f", 1)], vec![]);
        let mut right = Node::new(vec![item("p", 1), item("t", 1)], vec![]);
        let left_page = store.write_node(&mut left).expect("write");
        let right_page = store.write_node(&mut right).expect("write");

        let mut root = Node::new(vec![item("m", 1)], vec![left_page, right_page]);
        store.write_node(&mut root).expect("write");
        root
    }

    #[test]
    fn test_find_key_descends_and_records_trail() {
        let dir = tempdir().expect("create temp dir");
        let mut store = Store::open(&dir.path().join("t.db"), &fixed_options()).expect("open");
        let root = two_level(&mut store);

        let loc = store.find_key(root.clone(), b"p", true).expect("find");
        assert!(loc.found);
        assert_eq!(loc.index, 0);
        assert_eq!(loc.ancestors, vec![1]);
        assert_eq!(loc.node.items[0].key(), b"p");

        // Found in the root itself: empty trail.
        let loc = store.find_key(root.clone(), b"m", true).expect("find");
        assert!(loc.found);
        assert!(loc.ancestors.is_empty());

        // Non-exact miss gives the leaf insertion point.
        let loc = store.find_key(root.clone(), b"d", false).expect("find");
        assert!(!loc.found);
        assert_eq!(loc.index, 1);
        assert_eq!(loc.ancestors, vec![0]);

        let err = store.find_key(root, b"d", true).expect_err("miss");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_path_follows_trail() {
        let dir = tempdir().expect("create temp dir");
        let mut store = Store::open(&dir.path().join("t.db"), &fixed_options()).expect("open");
        let root = two_level(&mut store);

        let path = store.load_path(root.clone(), &[1]).expect("path");
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], root);
        assert_eq!(path[1].items[1].key(), b"t");

        assert!(matches!(
            store.load_path(root, &[5]),
            Err(StorageError::Decode(_))
        ));
    }

    #[test]
    fn test_descent_into_self_loop_hits_depth_cap() {
        let dir = tempdir().expect("create temp dir");
        let mut store = Store::open(&dir.path().join("t.db"), &fixed_options()).expect("open");

        // An internal node whose children point back at itself.
        let mut node = Node::new(vec![item("m", 1)], vec![0, 0]);
        let page = store.write_node(&mut node).expect("write");
        node.child_pages = vec![page, page];
        store.write_node(&mut node).expect("rewrite");

        let result = store.find_key(node, b"a", false);
        assert!(matches!(result, Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_split_five_item_leaf() {
        let dir = tempdir().expect("create temp dir");
        // Min threshold 409.6 bytes: with 260-byte elements the running size
        // passes it at the second item, so the split index is 2.
        let options = Options {
            min_fill_percent: 0.1,
            ..fixed_options()
        };
        let mut store = Store::open(&dir.path().join("t.db"), &options).expect("open");

        let mut child = Node::new((0..5).map(|i| keyed(i, 242)).collect(), vec![]);
        assert_eq!(child.element_size(0), 260);
        assert_eq!(store.split_index(&child), Some(2));
        let child_page = store.write_node(&mut child).expect("write");

        let mut other = Node::new(vec![item("zzzz", 1)], vec![]);
        let other_page = store.write_node(&mut other).expect("write");
        let mut parent = Node::new(vec![item("zzz", 0)], vec![child_page, other_page]);

        store.split(&mut parent, &mut child, 0).expect("split");

        let keys = |node: &Node| -> Vec<Vec<u8>> {
            node.items.iter().map(|i| i.key().to_vec()).collect()
        };
        assert_eq!(keys(&child), vec![keyed(0, 0).key(), keyed(1, 0).key()]);
        assert_eq!(keys(&parent), vec![keyed(2, 0).key(), b"zzz".as_slice()]);

        assert_eq!(parent.child_pages.len(), 3);
        assert_eq!(parent.child_pages[0], child_page);
        assert_eq!(parent.child_pages[2], other_page);

        // Both halves were written.
        let sibling = store.get_node(parent.child_pages[1]).expect("sibling");
        assert_eq!(keys(&sibling), vec![keyed(3, 0).key(), keyed(4, 0).key()]);
        assert_eq!(store.get_node(child_page).expect("child"), child);
    }

    #[test]
    fn test_split_over_populated_leaf_under_new_root() {
        let dir = tempdir().expect("create temp dir");
        let mut store = Store::open(&dir.path().join("t.db"), &fixed_options()).expect("open");

        // 33 items of 118 bytes each: node size 3905, over the 3891 threshold
        // while the encoding still fits the page.
        let mut child = Node::new((0..33).map(|i| keyed(i, 100)).collect(), vec![]);
        assert!(store.is_over_populated(&child));
        let child_page = store.write_node(&mut child).expect("write");

        let mut root = Node::new(vec![], vec![child_page]);
        store.split(&mut root, &mut child, 0).expect("split");

        assert_eq!(root.items.len(), 1);
        assert_eq!(root.child_pages.len(), 2);
        let sibling = store.get_node(root.child_pages[1]).expect("sibling");

        assert!(!store.is_over_populated(&child));
        assert!(!store.is_over_populated(&sibling));
        assert_eq!(child.items.len() + 1 + sibling.items.len(), 33);

        // Separator orders the halves.
        let separator = root.items[0].key();
        assert!(child.items.iter().all(|i| i.key() < separator));
        assert!(sibling.items.iter().all(|i| i.key() > separator));
    }

    #[test]
    fn test_split_internal_moves_children() {
        let dir = tempdir().expect("create temp dir");
        let options = Options {
            min_fill_percent: 0.1,
            ..fixed_options()
        };
        let mut store = Store::open(&dir.path().join("t.db"), &options).expect("open");

        let mut child = Node::new(
            (0..5).map(|i| keyed(i, 242)).collect(),
            vec![10, 11, 12, 13, 14, 15],
        );
        let child_page = store.write_node(&mut child).expect("write");
        let mut parent = Node::new(vec![], vec![child_page]);

        store.split(&mut parent, &mut child, 0).expect("split");

        assert_eq!(child.child_pages, vec![10, 11, 12]);
        let sibling = store.get_node(parent.child_pages[1]).expect("sibling");
        assert_eq!(sibling.child_pages, vec![13, 14, 15]);
        assert_eq!(sibling.items.len(), 2);
    }

    #[test]
    fn test_low_min_fill_split_keeps_every_piece_under_max() {
        let dir = tempdir().expect("create temp dir");
        let options = Options {
            min_fill_percent: 0.01,
            ..fixed_options()
        };
        let mut store = Store::open(&dir.path().join("t.db"), &options).expect("open");

        // A single cut at the split index would leave almost everything in
        // the sibling.
        let mut items: Vec<Item> = (0u16..370)
            .map(|i| Item::new(i.to_be_bytes().to_vec(), Vec::new()).expect("item"))
            .collect();
        items.push(Item::new(vec![0xff; 255], vec![b'v'; 255]).expect("item"));
        let mut child = Node::new(items, vec![]);
        assert_eq!(child.node_size(), 4229);
        let child_page = store.assign_page(&mut child);

        let mut parent = Node::new(vec![], vec![child_page]);
        store.split(&mut parent, &mut child, 0).expect("split");

        assert_eq!(parent.child_pages.len(), parent.items.len() + 1);
        assert_eq!(parent.child_pages[0], child_page);

        let mut keys = Vec::new();
        for (i, &page) in parent.child_pages.iter().enumerate() {
            let piece = store.get_node(page).expect("piece");
            assert!(!store.is_over_populated(&piece), "piece {i} over max");
            keys.extend(piece.items.iter().map(|item| item.key().to_vec()));
            if let Some(separator) = parent.items.get(i) {
                keys.push(separator.key().to_vec());
            }
        }
        assert_eq!(keys.len(), 371);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_split_node_writes_nothing() {
        let dir = tempdir().expect("create temp dir");
        let options = Options {
            min_fill_percent: 0.1,
            ..fixed_options()
        };
        let mut store = Store::open(&dir.path().join("t.db"), &options).expect("open");

        let mut child = Node::new((0..5).map(|i| keyed(i, 242)).collect(), vec![]);
        let child_page = store.write_node(&mut child).expect("write");
        let mut parent = Node::new(vec![], vec![child_page]);

        let siblings = store.split_node(&mut parent, &mut child, 0).expect("split");
        assert_eq!(siblings.len(), 1);
        assert_eq!(parent.child_pages[1], siblings[0].page_number.expect("page"));

        // The page still holds all five items.
        assert_eq!(store.get_node(child_page).expect("child").items.len(), 5);
        assert_eq!(child.items.len(), 2);
    }

    #[test]
    fn test_split_without_split_point_fails() {
        let dir = tempdir().expect("create temp dir");
        let mut store = Store::open(&dir.path().join("t.db"), &fixed_options()).expect("open");

        let mut child = Node::new(vec![item("a", 1)], vec![]);
        store.write_node(&mut child).expect("write");
        let mut parent = Node::new(vec![], vec![1]);

        let result = store.split(&mut parent, &mut child, 0);
        assert!(matches!(result, Err(StorageError::CapacityExceeded(_))));
        assert!(parent.items.is_empty());
    }
}
