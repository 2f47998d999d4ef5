//! # XC-03 Storage
//!
//! Durable tables behind the write-ahead log and the swap state machine.
//!
//! **Subsystem ID:** 3
//! **Architecture:** Hexagonal (domain, ports, adapters, service)
//!
//! ## Tables
//!
//! | Table | Key | Contents |
//! |-------|-----|----------|
//! | settings | `settings/version` | schema version |
//! | state_changes | id (1, 2, ...) | serialized state change |
//! | state_events | id | event + source state change + block number |
//! | state_snapshot | single row | last folded id + state |
//! | parked_state_changes | id | deferred changes, never replayed |
//! | crosstransaction | swap identifier | `CrossTransactionRecord` |
//! | payment_node | single row | off-chain payment node credentials |
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Dense ids | State-change ids are assigned 1, 2, 3, ... with no gaps |
//! | 2 | Atomic writes | A row and its counter or index land in one batch |
//! | 3 | Serialized row updates | Swap-row column updates never lose a write |
//! | 4 | Versioned rows | Every swap-row write bumps `version` |
//!
//! ## Usage
//!
//! ```ignore
//! use xc_03_storage::{FileBackedKVStore, RangeBound, Storage};
//!
//! let storage = Storage::open(FileBackedKVStore::open("node.db")?)?;
//! let id = storage.write_state_change(&change)?;
//! let replay = storage.get_statechanges_by_identifier::<Change>(RangeBound::Id(id), RangeBound::Latest)?;
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export key types for convenience
pub use adapters::{BincodeSerializer, FileBackedKVStore, InMemoryKVStore, JsonSerializer};
#[cfg(feature = "locking")]
pub use adapters::{DatabaseLock, LockError};
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use domain::{
    resolve_range, KVStoreError, PaymentNodeCredentials, RangeBound, SerializationError,
    SnapshotRecord, StorageError, StoredEvent, DB_VERSION,
};
pub use ports::{BatchOperation, KeyValueStore, StateSerializer};
pub use service::Storage;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
