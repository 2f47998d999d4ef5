//! # Value Objects
//!
//! Stored swap status.

use serde::{Deserialize, Serialize};

use super::errors::SwapError;

/// Lifecycle of a cross-transaction row.
///
/// Code 7 is deliberately absent: it is the wire-level sync-ack
/// (`AcceptCode::SyncAck`) and never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SwapStatus {
    /// Row created from a swap-initiate.
    #[default]
    Created = 1,
    /// Responder sent its accept.
    AcceptSent = 2,
    /// Initiator received the accept.
    Accepted = 3,
    /// Locked transfer for the swap received.
    Locked = 4,
    /// Secret request received before the secret was known.
    SecretRequestPending = 5,
    /// Off-chain leg delivered the secret.
    SecretReady = 6,
    /// Both sides agree the swap is settled.
    Synced = 8,
}

impl SwapStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        use SwapStatus::*;
        match (self, next) {
            (Synced, _) => false,
            (Created, AcceptSent) | (Created, Accepted) => true,
            (AcceptSent, Locked) => true,
            (Created | AcceptSent | Accepted | Locked, SecretRequestPending) => true,
            (Created | AcceptSent | Accepted | Locked | SecretRequestPending, SecretReady) => true,
            (_, Synced) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Synced)
    }

    /// Integer code persisted in storage.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Lowercase name for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::Created => "created",
            SwapStatus::AcceptSent => "accept_sent",
            SwapStatus::Accepted => "accepted",
            SwapStatus::Locked => "locked",
            SwapStatus::SecretRequestPending => "secret_request_pending",
            SwapStatus::SecretReady => "secret_ready",
            SwapStatus::Synced => "synced",
        }
    }
}

impl TryFrom<u8> for SwapStatus {
    type Error = SwapError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => SwapStatus::Created,
            2 => SwapStatus::AcceptSent,
            3 => SwapStatus::Accepted,
            4 => SwapStatus::Locked,
            5 => SwapStatus::SecretRequestPending,
            6 => SwapStatus::SecretReady,
            8 => SwapStatus::Synced,
            other => return Err(SwapError::UnknownStatus(other)),
        })
    }
}
