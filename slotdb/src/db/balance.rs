//! Bottom-up repair of a root-to-node path after an insert or delete.
//!
//! The path is the list of nodes from the root down to the node that was
//! modified, and `ancestors[i]` is the index of `path[i + 1]` within
//! `path[i].child_pages`. Every function here writes the nodes it changes
//! through the store; none of them persist meta or the allocator.

use tracing::info;

use crate::storage::{Node, PageNumber, StorageError, Store};

/// Nodes produced by a split pass, held back until every level is planned.
#[derive(Default)]
struct Pending {
    nodes: Vec<Node>,
    fresh: Vec<PageNumber>,
}

impl Pending {
    /// Split `node` under `parent`, queueing the new siblings ahead of it.
    fn split(
        &mut self,
        store: &mut Store,
        parent: &mut Node,
        node: &mut Node,
        index: usize,
    ) -> Result<(), StorageError> {
        let siblings = store.split_node(parent, node, index)?;
        self.fresh
            .extend(siblings.iter().filter_map(|sibling| sibling.page_number));
        self.nodes.extend(siblings);
        Ok(())
    }

    fn assign(&mut self, store: &mut Store, node: &mut Node) -> PageNumber {
        match node.page_number {
            Some(page) => page,
            None => {
                let page = store.assign_page(node);
                self.fresh.push(page);
                page
            }
        }
    }

    fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    fn write(self, store: &mut Store) -> Result<(), StorageError> {
        for mut node in self.nodes {
            store.write_node(&mut node)?;
        }
        Ok(())
    }

    /// Hand the page numbers reserved by the pass back to the allocator.
    fn abandon(self, store: &mut Store) {
        for page in self.fresh {
            store.delete_node(page);
        }
    }
}

/// Split over-full nodes from the bottom of `path` upwards.
///
/// Stops at the first node that fits, since nothing above it changed. Every
/// level is planned before the first page is written, so a failed split
/// leaves the file as it was.
pub fn after_insert(
    store: &mut Store,
    mut path: Vec<Node>,
    ancestors: &[usize],
) -> Result<(), StorageError> {
    let mut pending = Pending::default();
    match plan_insert(store, &mut path, ancestors, &mut pending) {
        Ok(root) => {
            pending.write(store)?;
            if let Some(root) = root {
                store.set_root(root);
            }
            Ok(())
        }
        Err(e) => {
            pending.abandon(store);
            Err(e)
        }
    }
}

/// Returns the new root page when the pass reached the root.
fn plan_insert(
    store: &mut Store,
    path: &mut [Node],
    ancestors: &[usize],
    pending: &mut Pending,
) -> Result<Option<PageNumber>, StorageError> {
    for level in (1..path.len()).rev() {
        let (upper, lower) = path.split_at_mut(level);
        let node = &mut lower[0];

        if !store.can_split(node) {
            pending.push(std::mem::take(node));
            return Ok(None);
        }
        pending.split(store, &mut upper[level - 1], node, ancestors[level - 1])?;
        pending.push(std::mem::take(node));
    }

    match path.first_mut() {
        Some(root) => plan_root(store, std::mem::take(root), pending).map(Some),
        None => Ok(None),
    }
}

/// Queue `root` for writing, growing the tree while the top node is
/// over-full. Returns the page of the final top node.
fn plan_root(
    store: &mut Store,
    mut root: Node,
    pending: &mut Pending,
) -> Result<PageNumber, StorageError> {
    let old_root = root.page_number;
    let mut levels = 0;
    while store.can_split(&root) {
        let child = pending.assign(store, &mut root);
        let mut top = Node::new(Vec::new(), vec![child]);
        pending.split(store, &mut top, &mut root, 0)?;
        pending.push(std::mem::replace(&mut root, top));
        levels += 1;
    }

    let page = pending.assign(store, &mut root);
    pending.push(root);
    if levels > 0 {
        info!(?old_root, new_root = page, levels, "split root");
    }
    Ok(page)
}

/// Rebalance every node on `path` from the bottom up and write it.
///
/// Under-full nodes borrow from a sibling that can spare an item, or merge
/// with one. Nodes that outgrew their page (a larger predecessor, a
/// borrowed separator) are split.
pub fn after_delete(
    store: &mut Store,
    mut path: Vec<Node>,
    ancestors: &[usize],
) -> Result<(), StorageError> {
    for level in (1..path.len()).rev() {
        let index = ancestors[level - 1];
        let (upper, lower) = path.split_at_mut(level);
        let parent = &mut upper[level - 1];
        let node = &mut lower[0];

        if store.can_split(node) {
            store.split(parent, node, index)?;
        } else if store.is_under_populated(node) {
            rebalance(store, parent, node, index)?;
        } else {
            store.write_node(node)?;
        }
    }

    match path.into_iter().next() {
        Some(root) => settle_root(store, root),
        None => Ok(()),
    }
}

/// Write the root, splitting it under new roots or collapsing it into its
/// only child as needed, and point the meta record at the result.
pub fn settle_root(store: &mut Store, root: Node) -> Result<(), StorageError> {
    if !root.is_leaf() && root.items.is_empty() {
        let child = root.child_pages[0];
        if let Some(old_root) = root.page_number {
            store.delete_node(old_root);
        }
        store.set_root(child);
        info!(new_root = child, "collapsed root");
        return Ok(());
    }

    let mut pending = Pending::default();
    match plan_root(store, root, &mut pending) {
        Ok(page) => {
            pending.write(store)?;
            store.set_root(page);
            Ok(())
        }
        Err(e) => {
            pending.abandon(store);
            Err(e)
        }
    }
}

/// Fix an under-full `node`, the `index`-th child of `parent`.
///
/// Borrowing prefers the left sibling. A sibling can lend when it has a
/// split point, the same test used for growth splits.
fn rebalance(
    store: &mut Store,
    parent: &mut Node,
    node: &mut Node,
    index: usize,
) -> Result<(), StorageError> {
    let mut left = sibling(store, parent, index.checked_sub(1))?;
    if let Some(lender) = left.as_mut().filter(|n| store.split_index(n).is_some()) {
        borrow_from_left(parent, lender, node, index);
        store.write_node(lender)?;
        return write_child(store, parent, node, index);
    }

    let mut right = sibling(store, parent, Some(index + 1))?;
    if let Some(lender) = right.as_mut().filter(|n| store.split_index(n).is_some()) {
        borrow_from_right(parent, node, lender, index);
        store.write_node(lender)?;
        return write_child(store, parent, node, index);
    }

    if let Some(mut left) = left {
        let emptied = node.page_number;
        merge(parent, &mut left, std::mem::take(node), index - 1);
        if let Some(page) = emptied {
            store.delete_node(page);
        }
        return write_child(store, parent, &mut left, index - 1);
    }

    if let Some(right) = right {
        let emptied = right.page_number;
        merge(parent, node, right, index);
        if let Some(page) = emptied {
            store.delete_node(page);
        }
        return write_child(store, parent, node, index);
    }

    // Only child: nothing to borrow from or merge with.
    store.write_node(node)?;
    Ok(())
}

fn sibling(
    store: &Store,
    parent: &Node,
    index: Option<usize>,
) -> Result<Option<Node>, StorageError> {
    match index.and_then(|i| parent.child_pages.get(i)) {
        Some(&page) => store.get_node(page).map(Some),
        None => Ok(None),
    }
}

/// Rotate the left sibling's last item through the separator into `node`.
fn borrow_from_left(parent: &mut Node, left: &mut Node, node: &mut Node, index: usize) {
    let Some(item) = left.items.pop() else {
        return;
    };
    let separator = std::mem::replace(&mut parent.items[index - 1], item);
    node.items.insert(0, separator);
    if let Some(child) = left.child_pages.pop() {
        node.child_pages.insert(0, child);
    }
}

/// Rotate the right sibling's first item through the separator into `node`.
fn borrow_from_right(parent: &mut Node, node: &mut Node, right: &mut Node, index: usize) {
    if right.items.is_empty() {
        return;
    }
    let item = right.items.remove(0);
    let separator = std::mem::replace(&mut parent.items[index], item);
    node.items.push(separator);
    if !right.child_pages.is_empty() {
        node.child_pages.push(right.child_pages.remove(0));
    }
}

/// Fold `right` and the separator between them into `left`.
fn merge(parent: &mut Node, left: &mut Node, right: Node, separator: usize) {
    let item = parent.items.remove(separator);
    parent.child_pages.remove(separator + 1);
    left.items.push(item);
    left.items.extend(right.items);
    left.child_pages.extend(right.child_pages);
}

/// Write the `index`-th child of `parent`, splitting it first if a merge or
/// a borrowed separator made it too large.
fn write_child(
    store: &mut Store,
    parent: &mut Node,
    node: &mut Node,
    index: usize,
) -> Result<(), StorageError> {
    if store.can_split(node) {
        store.split(parent, node, index)
    } else {
        store.write_node(node).map(|_| ())
    }
}
