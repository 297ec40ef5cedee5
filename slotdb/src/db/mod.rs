//! High-level database interface.
//!
//! `Db` owns the store behind one process-wide reader/writer lock. Readers
//! take [`ReadTx`] handles concurrently; a single [`WriteTx`] excludes
//! everyone else until it is committed or dropped.

mod balance;
mod transaction;

use std::path::Path;
use std::sync::RwLock;

use crate::config::{ConfigError, Options};
use crate::storage::{StorageError, Store};

pub use transaction::{ReadTx, WriteTx};

/// A database instance.
pub struct Db {
    store: RwLock<Store>,
}

impl Db {
    /// Open the database at `path`, creating it if it does not exist.
    pub fn open(path: &Path, options: Options) -> Result<Self, DbError> {
        options.validate()?;
        let store = Store::open(path, &options)?;
        Ok(Self {
            store: RwLock::new(store),
        })
    }

    /// Begin a read transaction.
    pub fn read_tx(&self) -> Result<ReadTx<'_>, DbError> {
        let guard = self.store.read().map_err(|_| DbError::LockPoisoned)?;
        Ok(ReadTx::new(guard))
    }

    /// Begin a write transaction, waiting for all other transactions to end.
    pub fn write_tx(&self) -> Result<WriteTx<'_>, DbError> {
        let guard = self.store.write().map_err(|_| DbError::LockPoisoned)?;
        Ok(WriteTx::new(guard))
    }

    /// Sync and close the file. Later transactions fail with
    /// `StorageError::Closed`; closing again does nothing.
    pub fn close(&self) -> Result<(), DbError> {
        let mut store = self.store.write().map_err(|_| DbError::LockPoisoned)?;
        store.close()?;
        Ok(())
    }
}

/// Errors that can occur during database operations.
#[derive(Debug)]
pub enum DbError {
    /// Storage engine error.
    Storage(StorageError),
    /// Invalid options.
    Config(ConfigError),
    /// A thread panicked while holding the database lock.
    LockPoisoned,
}

impl DbError {
    /// Whether the underlying storage error is `Closed`.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Closed))
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::LockPoisoned => write!(f, "database lock poisoned"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::LockPoisoned => None,
        }
    }
}

impl From<StorageError> for DbError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for DbError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
