//! # State Changes
//!
//! Facts fed into the transition function. Each one is persisted before it
//! is applied, so every variant is plain serializable data.

use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockNumber, Secret, SecretHash, U256};
use xc_01_wire_codec::{DirectTransfer, Lock, LockedTransfer, Unlock};

use super::state::{BalanceProof, ChannelState, RouteState};

/// A locked transfer as the state machine sees it, signature stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedTransferState {
    pub message_identifier: u64,
    pub payment_identifier: u64,
    pub token: Address,
    pub recipient: Address,
    pub balance_proof: BalanceProof,
    pub lock: Lock,
    pub initiator: Address,
    pub target: Address,
    pub fee: U256,
}

impl LockedTransferState {
    pub fn from_message(message: &LockedTransfer) -> Self {
        Self {
            message_identifier: message.message_identifier,
            payment_identifier: message.payment_identifier,
            token: message.token,
            recipient: message.recipient,
            balance_proof: BalanceProof {
                nonce: message.nonce,
                transferred_amount: message.transferred_amount,
                locked_amount: message.locked_amount,
                locksroot: message.locksroot,
                channel_identifier: message.channel,
                token_network_identifier: message.token_network_address,
                chain_id: message.chain_id,
            },
            lock: message.lock.clone(),
            initiator: message.initiator,
            target: message.target,
            fee: message.fee,
        }
    }
}

/// Balance proof carried by a direct transfer.
pub fn balanceproof_from_direct(message: &DirectTransfer) -> BalanceProof {
    BalanceProof {
        nonce: message.nonce,
        transferred_amount: message.transferred_amount,
        locked_amount: message.locked_amount,
        locksroot: message.locksroot,
        channel_identifier: message.channel,
        token_network_identifier: message.token_network_address,
        chain_id: message.chain_id,
    }
}

/// Balance proof carried by an unlock.
pub fn balanceproof_from_unlock(message: &Unlock) -> BalanceProof {
    BalanceProof {
        nonce: message.nonce,
        transferred_amount: message.transferred_amount,
        locked_amount: message.locked_amount,
        locksroot: message.locksroot,
        channel_identifier: message.channel,
        token_network_identifier: message.token_network_address,
        chain_id: message.chain_id,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChange {
    /// A new block was observed.
    Block { block_number: BlockNumber },

    /// A channel with `partner` was opened and funded.
    ActionNewChannel { channel: ChannelState },

    /// Start a mediated payment from this node.
    ActionInitInitiator {
        token_network_identifier: Address,
        payment_identifier: u64,
        amount: U256,
        target: Address,
        secret: Secret,
        expiration: U256,
        routes: Vec<RouteState>,
    },

    /// A locked transfer addressed to this node arrived.
    ActionInitTarget {
        sender: Address,
        transfer: LockedTransferState,
    },

    /// A locked transfer to forward arrived.
    ActionInitMediator {
        sender: Address,
        routes: Vec<RouteState>,
        transfer: LockedTransferState,
    },

    ReceiveSecretRequest {
        payment_identifier: u64,
        amount: U256,
        secrethash: SecretHash,
        sender: Address,
    },

    ReceiveSecretReveal { secret: Secret, sender: Address },

    ReceiveUnlock {
        message_identifier: u64,
        secret: Secret,
        sender: Address,
        balance_proof: BalanceProof,
    },

    ReceiveTransferDirect {
        token_network_identifier: Address,
        message_identifier: u64,
        payment_identifier: u64,
        sender: Address,
        balance_proof: BalanceProof,
    },

    /// The payee returned a lock this node mediated.
    ReceiveTransferRefund {
        sender: Address,
        transfer: LockedTransferState,
        routes: Vec<RouteState>,
    },

    /// The payee returned a lock this node initiated; retry under `secret`.
    ReceiveTransferRefundCancelRoute {
        sender: Address,
        routes: Vec<RouteState>,
        transfer: LockedTransferState,
        secret: Secret,
    },

    ReceiveProcessed {
        sender: Address,
        message_identifier: u64,
    },
}

impl StateChange {
    /// Variant name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StateChange::Block { .. } => "Block",
            StateChange::ActionNewChannel { .. } => "ActionNewChannel",
            StateChange::ActionInitInitiator { .. } => "ActionInitInitiator",
            StateChange::ActionInitTarget { .. } => "ActionInitTarget",
            StateChange::ActionInitMediator { .. } => "ActionInitMediator",
            StateChange::ReceiveSecretRequest { .. } => "ReceiveSecretRequest",
            StateChange::ReceiveSecretReveal { .. } => "ReceiveSecretReveal",
            StateChange::ReceiveUnlock { .. } => "ReceiveUnlock",
            StateChange::ReceiveTransferDirect { .. } => "ReceiveTransferDirect",
            StateChange::ReceiveTransferRefund { .. } => "ReceiveTransferRefund",
            StateChange::ReceiveTransferRefundCancelRoute { .. } => {
                "ReceiveTransferRefundCancelRoute"
            }
            StateChange::ReceiveProcessed { .. } => "ReceiveProcessed",
        }
    }
}
