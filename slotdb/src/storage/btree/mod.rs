//! Disk-resident B-tree.
//!
//! [`node`] defines the in-memory node and its slotted-page encoding.
//! [`tree`] adds descent and splitting on top of the store. Multi-level
//! insert and delete live in the transaction layer.
//!
//! # Usage
//!
//! ```
//! use slotdb::storage::btree::{Item, Node};
//!
//! let node = Node::new(
//!     vec![
//!         Item::new(b"a".to_vec(), b"1".to_vec()).unwrap(),
//!         Item::new(b"b".to_vec(), b"2".to_vec()).unwrap(),
//!     ],
//!     vec![],
//! );
//!
//! assert!(node.is_leaf());
//! assert_eq!(node.node_size(), 31);
//! assert_eq!(node.find_key_in_node(b"b"), Ok(1));
//! assert_eq!(node.find_key_in_node(b"ab"), Err(1));
//! ```

mod node;
mod tree;

pub use node::{Item, MAX_KEY_LEN, MAX_VALUE_LEN, NODE_HEADER_SIZE, Node};
pub use tree::{KeyLocation, MAX_TREE_DEPTH};
