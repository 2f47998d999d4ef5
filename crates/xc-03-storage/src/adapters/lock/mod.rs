//! Process-level locking of the data directory.

mod flock;

pub use flock::{DatabaseLock, LockError};
