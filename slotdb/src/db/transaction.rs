//! Read and write transactions.
//!
//! A transaction is a lock guard over the store plus the multi-node insert
//! and delete logic. There is no isolation beyond the lock and no rollback:
//! node pages are written as operations run, and `commit` persists the
//! allocator and meta record, then syncs.

use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::db::DbError;
use crate::db::balance;
use crate::storage::{Item, KeyLocation, MAX_TREE_DEPTH, Node, StorageError, Store};

/// Shared access to the database. Any number may be open at once.
pub struct ReadTx<'a> {
    store: RwLockReadGuard<'a, Store>,
}

impl<'a> ReadTx<'a> {
    pub(crate) const fn new(store: RwLockReadGuard<'a, Store>) -> Self {
        Self { store }
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        Ok(lookup(&self.store, key)?)
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

/// Exclusive access to the database.
///
/// Dropping a transaction that changed the tree without committing leaves
/// the allocator and meta updates in memory, to be persisted by the next
/// commit.
pub struct WriteTx<'a> {
    store: RwLockWriteGuard<'a, Store>,
    dirty: bool,
    committed: bool,
}

impl<'a> WriteTx<'a> {
    pub(crate) const fn new(store: RwLockWriteGuard<'a, Store>) -> Self {
        Self {
            store,
            dirty: false,
            committed: false,
        }
    }

    /// Look up the value stored under `key`, including uncommitted changes.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        Ok(lookup(&self.store, key)?)
    }

    /// Insert `key`, replacing any existing value.
    ///
    /// Oversized keys or values are rejected before anything is written.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        let item = Item::new(key.to_vec(), value.to_vec())?;
        let store = &mut *self.store;
        ensure_open(store)?;
        self.dirty = true;

        if store.root() == 0 {
            let root = Node::new(vec![item], Vec::new());
            balance::settle_root(store, root)?;
            return Ok(());
        }

        let root = store.get_node(store.root())?;
        let KeyLocation {
            index,
            mut node,
            ancestors,
            found,
        } = store.find_key(root.clone(), key, false)?;

        if found {
            node.items[index] = item;
        } else {
            node.items.insert(index, item);
        }

        let mut path = store.load_path(root, &ancestors)?;
        if let Some(last) = path.last_mut() {
            *last = node;
        }
        balance::after_insert(store, path, &ancestors)?;
        Ok(())
    }

    /// Remove `key`, returning the value it held.
    pub fn delete(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        let store = &mut *self.store;
        ensure_open(store)?;
        if store.root() == 0 {
            return Ok(None);
        }

        let root = store.get_node(store.root())?;
        let KeyLocation {
            index,
            node,
            mut ancestors,
            ..
        } = match store.find_key(root.clone(), key, true) {
            Ok(location) => location,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.dirty = true;

        let mut path = store.load_path(root, &ancestors)?;
        let target = path.len() - 1;
        path[target] = node;

        let removed = if path[target].is_leaf() {
            path[target].items.remove(index)
        } else {
            let predecessor = take_predecessor(store, &mut path, &mut ancestors, index)?;
            std::mem::replace(&mut path[target].items[index], predecessor)
        };

        balance::after_delete(store, path, &ancestors)?;
        Ok(Some(removed.into_value()))
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Persist the allocator and meta record and sync the file.
    pub fn commit(mut self) -> Result<(), DbError> {
        self.store.write_freelist()?;
        self.store.write_meta()?;
        self.store.sync()?;
        self.committed = true;

        debug!(root = self.store.root(), "committed write transaction");
        Ok(())
    }
}

impl Drop for WriteTx<'_> {
    fn drop(&mut self) {
        if self.dirty && !self.committed {
            warn!("write transaction dropped without commit; meta and allocator changes are pending");
        }
    }
}

fn ensure_open(store: &Store) -> Result<(), StorageError> {
    if store.is_closed() {
        return Err(StorageError::Closed);
    }
    Ok(())
}

fn lookup(store: &Store, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
    ensure_open(store)?;
    if store.root() == 0 {
        return Ok(None);
    }

    let root = store.get_node(store.root())?;
    match store.find_key(root, key, true) {
        Ok(mut location) => Ok(Some(location.node.items.swap_remove(location.index).into_value())),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Pop the in-order predecessor of `items[index]` in the last node of `path`.
///
/// Descends into the left child of the item and then always rightmost down
/// to a leaf, extending `path` and `ancestors` with every node visited.
fn take_predecessor(
    store: &Store,
    path: &mut Vec<Node>,
    ancestors: &mut Vec<usize>,
    index: usize,
) -> Result<Item, StorageError> {
    let mut child_index = index;
    while let Some(node) = path.last().filter(|n| !n.is_leaf()) {
        if ancestors.len() >= MAX_TREE_DEPTH {
            return Err(StorageError::Decode(format!(
                "tree deeper than {MAX_TREE_DEPTH} levels"
            )));
        }
        let page = *node.child_pages.get(child_index).ok_or_else(|| {
            StorageError::Decode(format!("child index {child_index} out of range"))
        })?;
        let child = store.get_node(page)?;

        ancestors.push(child_index);
        child_index = child.child_pages.len().saturating_sub(1);
        path.push(child);
    }

    path.last_mut()
        .and_then(|leaf| leaf.items.pop())
        .ok_or_else(|| StorageError::Decode("empty leaf below an internal node".to_string()))
}
