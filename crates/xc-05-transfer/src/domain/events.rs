//! # Events
//!
//! Effects produced by the transition function. `Send*` events ask the node
//! to put a message on the wire; the rest are notifications.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Secret, SecretHash, U256};

use super::state::BalanceProof;
use super::state_changes::LockedTransferState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SendLockedTransfer {
        recipient: Address,
        transfer: LockedTransferState,
    },

    SendRefundTransfer {
        recipient: Address,
        transfer: LockedTransferState,
    },

    SendSecretRequest {
        recipient: Address,
        message_identifier: u64,
        payment_identifier: u64,
        amount: U256,
        secrethash: SecretHash,
    },

    SendRevealSecret {
        recipient: Address,
        message_identifier: u64,
        secret: Secret,
    },

    /// Off-chain unlock: the secret with the updated balance proof.
    SendUnlock {
        recipient: Address,
        message_identifier: u64,
        payment_identifier: u64,
        secret: Secret,
        balance_proof: BalanceProof,
    },

    SendProcessed {
        recipient: Address,
        message_identifier: u64,
    },

    EventPaymentSentSuccess {
        payment_identifier: u64,
        amount: U256,
        target: Address,
    },

    EventPaymentSentFailed {
        payment_identifier: u64,
        reason: String,
    },

    EventPaymentReceivedSuccess {
        payment_identifier: u64,
        amount: U256,
        initiator: Address,
    },

    EventUnlockSuccess {
        payment_identifier: u64,
        secrethash: SecretHash,
    },

    EventTransferReceivedInvalidDirectTransfer {
        payment_identifier: u64,
        reason: String,
    },

    EventInvalidReceivedLockedTransfer {
        payment_identifier: u64,
        reason: String,
    },

    EventInvalidReceivedUnlock { reason: String },

    EventInvalidSecretRequest {
        payment_identifier: u64,
        reason: String,
    },
}

impl Event {
    /// Recipient for events that put a message on the wire.
    pub fn recipient(&self) -> Option<Address> {
        match self {
            Event::SendLockedTransfer { recipient, .. }
            | Event::SendRefundTransfer { recipient, .. }
            | Event::SendSecretRequest { recipient, .. }
            | Event::SendRevealSecret { recipient, .. }
            | Event::SendUnlock { recipient, .. }
            | Event::SendProcessed { recipient, .. } => Some(*recipient),
            _ => None,
        }
    }

    pub fn is_send(&self) -> bool {
        self.recipient().is_some()
    }

    /// Identifier of the message a `Send*` event puts on the wire.
    pub fn message_identifier(&self) -> Option<u64> {
        match self {
            Event::SendLockedTransfer { transfer, .. }
            | Event::SendRefundTransfer { transfer, .. } => Some(transfer.message_identifier),
            Event::SendSecretRequest {
                message_identifier, ..
            }
            | Event::SendRevealSecret {
                message_identifier, ..
            }
            | Event::SendUnlock {
                message_identifier, ..
            }
            | Event::SendProcessed {
                message_identifier, ..
            } => Some(*message_identifier),
            _ => None,
        }
    }
}
