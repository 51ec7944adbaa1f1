//! Durable-store error taxonomy.
//!
//! Backend errors are wrapped as strings at the boundary so callers
//! never depend on redb types; the variants split along what the
//! caller can do about it (retry the transaction, skip the row, refuse
//! the input, degrade).

use thiserror::Error;

/// Result type alias for durable store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The fleet database could not be opened or created.
    #[error("failed to open fleet database: {0}")]
    Open(String),

    /// A transaction could not begin, access its tables, or commit.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A row could not be read.
    #[error("read failed: {0}")]
    Read(String),

    /// A row could not be written.
    #[error("write failed: {0}")]
    Write(String),

    /// A domain value could not be encoded for storage.
    #[error("failed to encode row: {0}")]
    Encode(String),

    /// A stored row could not be decoded back into a domain value.
    #[error("failed to decode row: {0}")]
    Decode(String),

    /// The host id cannot be used as a key.
    #[error("invalid host id {0:?}: must not contain ':'")]
    InvalidHostId(String),

    /// The store is temporarily unreachable; callers degrade and retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
