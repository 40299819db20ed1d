//! Storage error type.

use thiserror::Error;

/// Errors raised by a [`crate::KeyValueStorage`] implementation.
///
/// Callers in the pipeline never surface these to the product: a failing
/// store means degrading to in-memory state for the rest of the page load.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying file could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file held something other than a JSON string map.
    #[error("storage content malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The store denies access entirely (privacy mode analog).
    #[error("storage unavailable")]
    Unavailable,
}
