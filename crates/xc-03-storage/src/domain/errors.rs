//! # Storage Errors
//!
//! `CorruptStorage` is fatal at startup; everything else is reported to the
//! caller and the node keeps running.

use std::fmt;
use thiserror::Error;

/// Errors surfaced by the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A cross-transaction row with this identifier already exists.
    #[error("Duplicate cross-transaction identifier: {identifier}")]
    DuplicateIdentifier { identifier: String },

    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Range bounds are neither integers nor `latest`, or inconsistent.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Persisted bytes could not be decoded.
    #[error("Corrupt storage: {0}")]
    CorruptStorage(String),

    /// Full-row write presented a version older than the stored one.
    #[error("Stale write to cross-transaction {identifier}: expected version {expected}, found {found}")]
    StaleWrite {
        identifier: String,
        expected: u64,
        found: u64,
    },

    /// Another process holds the data directory.
    #[error("Database locked: {0}")]
    DatabaseLocked(String),

    /// Backend I/O failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A value could not be serialized for writing.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key-value backend errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KVStoreError {
    /// I/O error during read/write.
    IOError { message: String },
    /// Data corruption in the store.
    CorruptionError { message: String },
}

impl fmt::Display for KVStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::IOError { message } => write!(f, "KV store I/O error: {}", message),
            KVStoreError::CorruptionError { message } => {
                write!(f, "KV store corruption: {}", message)
            }
        }
    }
}

impl std::error::Error for KVStoreError {}

impl From<KVStoreError> for StorageError {
    fn from(err: KVStoreError) -> Self {
        match err {
            KVStoreError::CorruptionError { message } => StorageError::CorruptStorage(message),
            KVStoreError::IOError { .. } => StorageError::Database(err.to_string()),
        }
    }
}

/// Serializer adapter errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationError {
    pub message: String,
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serialization error: {}", self.message)
    }
}

impl std::error::Error for SerializationError {}
