//! Error type shared by the page store, allocator, meta record and node codec.

use crate::config::ConfigError;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error at the OS boundary.
    Io(std::io::Error),
    /// Page bytes do not match the expected encoding.
    Decode(String),
    /// A key or value exceeds the single-byte length prefix of a cell.
    OversizedItem { key_len: usize, value_len: usize },
    /// An exact search reached a leaf without finding the key.
    NotFound,
    /// The content does not fit in one page.
    CapacityExceeded(String),
    /// The store has been closed.
    Closed,
    /// The options passed to `Store::open` failed validation.
    InvalidOptions(ConfigError),
}

impl StorageError {
    /// Whether this is the expected "key absent" outcome rather than a failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::OversizedItem { key_len, value_len } => write!(
                f,
                "item too large: key {key_len} bytes, value {value_len} bytes (max {} each)",
                crate::storage::btree::MAX_KEY_LEN
            ),
            Self::NotFound => write!(f, "key not found"),
            Self::CapacityExceeded(msg) => write!(f, "capacity exceeded: {msg}"),
            Self::Closed => write!(f, "store is closed"),
            Self::InvalidOptions(e) => write!(f, "invalid options: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidOptions(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
