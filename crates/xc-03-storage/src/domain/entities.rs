//! # Storage Entities
//!
//! Row shapes for the state-change, event and snapshot tables plus the
//! range bounds accepted by the range queries.

use serde::{Deserialize, Serialize};
use shared_types::BlockNumber;
use std::fmt;
use std::str::FromStr;

use super::errors::StorageError;

/// Schema version written to `settings` on first open.
pub const DB_VERSION: u32 = 0;

/// One end of an inclusive range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Id(u64),
    /// The highest identifier (or block) currently stored.
    Latest,
}

impl FromStr for RangeBound {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "latest" {
            return Ok(RangeBound::Latest);
        }
        s.parse::<u64>().map(RangeBound::Id).map_err(|_| {
            StorageError::InvalidRange(format!("{:?} is neither an integer nor \"latest\"", s))
        })
    }
}

impl From<u64> for RangeBound {
    fn from(id: u64) -> Self {
        RangeBound::Id(id)
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Id(id) => write!(f, "{}", id),
            RangeBound::Latest => write!(f, "latest"),
        }
    }
}

/// Resolve `(from, to)` against the highest stored value.
///
/// `Ok(None)` means the range is empty.
pub fn resolve_range(
    from: RangeBound,
    to: RangeBound,
    latest: Option<u64>,
) -> Result<Option<(u64, u64)>, StorageError> {
    if let (RangeBound::Latest, RangeBound::Id(_)) = (from, to) {
        return Err(StorageError::InvalidRange(format!(
            "from=latest requires to=latest, got to={}",
            to
        )));
    }
    let Some(latest) = latest else {
        return Ok(None);
    };
    let low = match from {
        RangeBound::Id(id) => id,
        RangeBound::Latest => latest,
    };
    let high = match to {
        RangeBound::Id(id) => id,
        RangeBound::Latest => latest,
    };
    Ok((low <= high).then_some((low, high)))
}

/// The single retained snapshot row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord<S> {
    /// Last state change folded into `state`.
    pub state_change_id: u64,
    pub state: S,
}

/// An event row tagged with the change that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    pub event_id: u64,
    pub source_statechange_id: u64,
    pub block_number: BlockNumber,
    pub event: E,
}

/// Connection record for the off-chain payment node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNodeCredentials {
    pub port: u16,
    pub identity: String,
    pub address: String,
    pub macaroon: String,
}
