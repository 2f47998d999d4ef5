//! # Node Configuration
//!
//! Runtime parameters, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `XC_DATA_DIR` | `./data` | Directory for the storage file / RocksDB and the lock file |
//! | `XC_STORAGE_BACKEND` | `file` | `file`, `memory` or `rocksdb` |
//! | `XC_COLLABORATOR_TIMEOUT_SECS` | `10` | Bound on every signer/transport/swap-leg call |
//! | `XC_SNAPSHOT_INTERVAL` | `500` | Snapshot after this many state changes (0 = only on shutdown) |
//! | `XC_PRIVATE_KEY` | random | 32-byte secp256k1 key, hex |
//! | `XC_CHAIN_ID` | `337` | Chain id balance proofs must carry |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shared_types::U256;
use thiserror::Error;

/// Name of the storage file inside the data directory.
pub const STORAGE_FILE: &str = "node.db";

/// Name of the RocksDB directory inside the data directory.
pub const ROCKSDB_DIR: &str = "rocksdb";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    /// The backend was not compiled into this binary.
    #[error("Storage backend {0} is not available in this build")]
    BackendUnavailable(&'static str),

    /// Collaborator calls would time out immediately.
    #[error("Collaborator timeout must be at least one second")]
    ZeroTimeout,

    /// Chain id zero is never valid for balance proofs.
    #[error("Chain id must not be zero")]
    ZeroChainId,
}

/// Key-value backend behind storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// Nothing survives a restart.
    Memory,
    /// One checksummed file, rewritten atomically.
    #[default]
    File,
    /// RocksDB (requires the `rocksdb` feature).
    RocksDb,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File => "file",
            StorageBackend::RocksDb => "rocksdb",
        }
    }

    /// Whether the backend writes under the data directory.
    pub fn is_persistent(self) -> bool {
        !matches!(self, StorageBackend::Memory)
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "rocksdb" | "rocks" => Ok(StorageBackend::RocksDb),
            other => Err(ConfigError::InvalidValue {
                var: "XC_STORAGE_BACKEND",
                reason: format!("unknown backend {:?}", other),
            }),
        }
    }
}

/// Complete node configuration.
#[derive(Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    pub collaborator_timeout: Duration,
    pub snapshot_interval: u64,
    /// Node key; a fresh one is generated when unset.
    pub private_key: Option<[u8; 32]>,
    pub chain_id: U256,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("data_dir", &self.data_dir)
            .field("storage_backend", &self.storage_backend)
            .field("collaborator_timeout", &self.collaborator_timeout)
            .field("snapshot_interval", &self.snapshot_interval)
            .field("private_key", &self.private_key.map(|_| "<redacted>"))
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage_backend: StorageBackend::default(),
            collaborator_timeout: Duration::from_secs(10),
            snapshot_interval: 500,
            private_key: None,
            chain_id: U256::from(337),
        }
    }
}

impl NodeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("XC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("XC_STORAGE_BACKEND") {
            config.storage_backend = backend.parse()?;
        }
        if let Some(secs) = lookup("XC_COLLABORATOR_TIMEOUT_SECS") {
            config.collaborator_timeout =
                Duration::from_secs(parse_number("XC_COLLABORATOR_TIMEOUT_SECS", &secs)?);
        }
        if let Some(interval) = lookup("XC_SNAPSHOT_INTERVAL") {
            config.snapshot_interval = parse_number("XC_SNAPSHOT_INTERVAL", &interval)?;
        }
        if let Some(key) = lookup("XC_PRIVATE_KEY") {
            config.private_key = Some(parse_private_key(&key)?);
        }
        if let Some(chain_id) = lookup("XC_CHAIN_ID") {
            config.chain_id = U256::from_dec_str(chain_id.trim()).map_err(|e| {
                ConfigError::InvalidValue {
                    var: "XC_CHAIN_ID",
                    reason: format!("{:?}", e),
                }
            })?;
        }
        Ok(config)
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collaborator_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.chain_id.is_zero() {
            return Err(ConfigError::ZeroChainId);
        }
        if self.storage_backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::BackendUnavailable("rocksdb"));
        }
        Ok(())
    }

    pub fn storage_file(&self) -> PathBuf {
        self.data_dir.join(STORAGE_FILE)
    }

    pub fn rocksdb_dir(&self) -> PathBuf {
        self.data_dir.join(ROCKSDB_DIR)
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
        var,
        reason: e.to_string(),
    })
}

fn parse_private_key(value: &str) -> Result<[u8; 32], ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var: "XC_PRIVATE_KEY",
        reason,
    };
    let trimmed = value.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| invalid(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| invalid(format!("expected 32 bytes, got {}", b.len())))
}
