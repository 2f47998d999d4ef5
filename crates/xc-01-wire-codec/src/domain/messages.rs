//! # Message Kinds
//!
//! One struct per wire kind with named, typed fields. The trailing signature
//! is carried as a plain field; the codec never verifies it.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Locksroot, Secret, SecretHash, Signature, U256};

use super::errors::DecodeError;

/// Command id occupying the first byte of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandId {
    Processed = 0,
    Ping = 1,
    Pong = 2,
    SecretRequest = 3,
    Secret = 4,
    DirectTransfer = 5,
    LockedTransfer = 7,
    RefundTransfer = 8,
    RevealSecret = 11,
    Delivered = 12,
    CrossTransaction = 13,
    AcceptCross = 14,
    CrossLockedTransfer = 15,
    CrossSecretRequest = 16,
}

impl CommandId {
    /// Lowercase kind name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            CommandId::Processed => "processed",
            CommandId::Ping => "ping",
            CommandId::Pong => "pong",
            CommandId::SecretRequest => "secret_request",
            CommandId::Secret => "secret",
            CommandId::DirectTransfer => "direct_transfer",
            CommandId::LockedTransfer => "locked_transfer",
            CommandId::RefundTransfer => "refund_transfer",
            CommandId::RevealSecret => "reveal_secret",
            CommandId::Delivered => "delivered",
            CommandId::CrossTransaction => "cross_transaction",
            CommandId::AcceptCross => "accept_cross",
            CommandId::CrossLockedTransfer => "cross_locked_transfer",
            CommandId::CrossSecretRequest => "cross_secret_request",
        }
    }
}

impl TryFrom<u8> for CommandId {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => CommandId::Processed,
            1 => CommandId::Ping,
            2 => CommandId::Pong,
            3 => CommandId::SecretRequest,
            4 => CommandId::Secret,
            5 => CommandId::DirectTransfer,
            7 => CommandId::LockedTransfer,
            8 => CommandId::RefundTransfer,
            11 => CommandId::RevealSecret,
            12 => CommandId::Delivered,
            13 => CommandId::CrossTransaction,
            14 => CommandId::AcceptCross,
            15 => CommandId::CrossLockedTransfer,
            16 => CommandId::CrossSecretRequest,
            other => return Err(DecodeError::UnknownCommand(other)),
        })
    }
}

/// Who originated a swap-initiate message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CrossType {
    /// Submitted by the local user; the node forwards it to the target.
    LocalOrigin = 0,
    /// Received from the counterparty; the node answers with an accept.
    Remote = 1,
}

impl TryFrom<u8> for CrossType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(CrossType::LocalOrigin),
            1 => Ok(CrossType::Remote),
            other => Err(other),
        }
    }
}

/// Value of the `accept` byte in an AcceptCross message.
///
/// Distinct from the stored swap status: only these two values ever travel
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AcceptCode {
    /// The responder agrees to the swap.
    Accept = 1,
    /// The secret request was resolved; both sides are in sync.
    SyncAck = 7,
}

impl TryFrom<u8> for AcceptCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(AcceptCode::Accept),
            7 => Ok(AcceptCode::SyncAck),
            other => Err(other),
        }
    }
}

// =============================================================================
// CHANNEL MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processed {
    pub message_identifier: u64,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivered {
    pub delivered_message_identifier: u64,
    pub signature: Signature,
}

/// Liveness probe; Pong shares the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub nonce: u64,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub nonce: u64,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRequest {
    pub message_identifier: u64,
    pub payment_identifier: u64,
    pub secrethash: SecretHash,
    pub amount: U256,
    pub signature: Signature,
}

/// Unlock: reveals the secret together with the updated balance proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unlock {
    pub chain_id: U256,
    pub message_identifier: u64,
    pub payment_identifier: u64,
    pub token_network_address: Address,
    pub secret: Secret,
    pub nonce: u64,
    pub channel: Address,
    pub transferred_amount: U256,
    pub locked_amount: U256,
    pub locksroot: Locksroot,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealSecret {
    pub message_identifier: u64,
    pub secret: Secret,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectTransfer {
    pub nonce: u64,
    pub chain_id: U256,
    pub message_identifier: u64,
    pub payment_identifier: u64,
    pub token_network_address: Address,
    pub token: Address,
    pub channel: Address,
    pub recipient: Address,
    pub transferred_amount: U256,
    pub locked_amount: U256,
    pub locksroot: Locksroot,
    pub signature: Signature,
}

/// Hash time lock carried by a locked transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub amount: U256,
    pub expiration: U256,
    pub secrethash: SecretHash,
}

/// Mediated transfer; also the body of a RefundTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedTransfer {
    pub nonce: u64,
    pub chain_id: U256,
    pub message_identifier: u64,
    pub payment_identifier: u64,
    pub token_network_address: Address,
    pub token: Address,
    pub channel: Address,
    pub recipient: Address,
    pub target: Address,
    pub initiator: Address,
    pub locksroot: Locksroot,
    pub lock: Lock,
    pub transferred_amount: U256,
    pub locked_amount: U256,
    pub fee: U256,
    pub signature: Signature,
}

// =============================================================================
// CROSS-CHAIN SWAP MESSAGES
// =============================================================================

/// Swap-initiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTransaction {
    pub message_identifier: u64,
    pub initiator_address: Address,
    pub target_address: Address,
    pub token_network_identifier: Address,
    pub send_eth_amount: U256,
    pub send_btc_amount: U256,
    pub receive_btc_address: String,
    pub cross_type: CrossType,
    pub identifier: U256,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptCross {
    pub message_identifier: u64,
    pub initiator_address: Address,
    pub target_address: Address,
    pub identifier: U256,
    pub accept: AcceptCode,
    pub signature: Signature,
}

/// A locked transfer bound to a swap.
///
/// `transfer.signature` travels as the embedded `locked_transfer_signature`
/// field, so the inner transfer stays verifiable after unwrapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLockedTransfer {
    pub transfer: LockedTransfer,
    pub cross_id: U256,
    pub payment_string: String,
    pub signature: Signature,
}

/// A secret request bound to a swap; `request.signature` is embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossSecretRequest {
    pub request: SecretRequest,
    pub cross_id: U256,
    pub signature: Signature,
}
