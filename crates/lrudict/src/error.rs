//! Error types for lrudict

use std::fmt;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by [`LruDict`](crate::LruDict) operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Capacity must be a positive number
    InvalidCapacity(usize),

    /// Key not present in the cache
    NotFound,

    /// Cache holds no entries
    Empty,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity(size) => {
                write!(f, "Invalid capacity: {} (size should be a positive number)", size)
            }
            Error::NotFound => write!(f, "Key not found"),
            Error::Empty => write!(f, "LRU dict is empty"),
        }
    }
}

impl std::error::Error for Error {}
