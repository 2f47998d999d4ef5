//! # Adapters
//!
//! Concrete implementations of the storage ports.

#[cfg(feature = "locking")]
pub mod lock;
pub mod serializer;
pub mod storage;

#[cfg(feature = "locking")]
pub use lock::{DatabaseLock, LockError};
pub use serializer::{BincodeSerializer, JsonSerializer};
pub use storage::{FileBackedKVStore, InMemoryKVStore};
#[cfg(feature = "rocksdb")]
pub use storage::{RocksDbConfig, RocksDbStore};
