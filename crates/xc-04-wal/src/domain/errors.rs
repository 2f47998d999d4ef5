//! Error types for the write-ahead log.

use thiserror::Error;
use xc_03_storage::StorageError;

/// Write-ahead log errors.
#[derive(Debug, Error)]
pub enum WalError {
    /// The underlying table read or write failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The snapshot claims to cover changes the log never recorded.
    #[error("Snapshot anchor {anchor} is ahead of the last logged state change {last:?}")]
    SnapshotAhead { anchor: u64, last: Option<u64> },
}
