// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() and expect() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! `slotdb`: an embedded key-value store in a single file of fixed-size
//! pages, indexed by a disk-resident B-tree.
//!
//! - [`storage`]: page file, free-page allocator, meta record, node codec and
//!   the store facade with descent and split.
//! - [`db`]: the locked database handle and its read/write transactions.
//! - [`config`]: engine options and environment loading.

pub mod config;
pub mod db;
pub mod storage;

#[cfg(test)]
mod testing;
