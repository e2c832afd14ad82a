//! Error types for in-memory table operations.

use entity_store_core::PrimaryKey;
use thiserror::Error;

/// Errors that can occur during `MemoryTable` operations.
#[derive(Error, Debug)]
pub enum MemoryStoreError {
    /// A row with the same primary key already exists.
    #[error("Duplicate primary key: {0}")]
    DuplicateKey(PrimaryKey),

    /// The row to merge does not exist.
    #[error("Row not found: {0}")]
    MissingRow(PrimaryKey),

    /// Failed to acquire the table lock.
    #[error("Table lock error")]
    LockError,

    /// Failure armed with `MemoryTable::fail_next_call`.
    #[error("Injected failure: {0}")]
    Injected(String),
}
