//! # Domain Entities
//!
//! The persisted cross-transaction row.

use serde::{Deserialize, Serialize};
use shared_types::{secrethash, Address, Secret, SecretHash, U256};
use xc_01_wire_codec::CrossTransaction;

use super::errors::SwapError;
use super::value_objects::SwapStatus;

/// A swap row keyed by its 256-bit identifier.
///
/// Created with status `Created`; mutated in place, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTransactionRecord {
    pub identifier: U256,
    pub initiator_address: Address,
    pub target_address: Address,
    pub token_network_identifier: Address,
    pub send_eth_amount: U256,
    pub send_btc_amount: U256,
    pub receive_btc_address: String,
    pub status: SwapStatus,
    /// State change applied (or parked) on behalf of this swap.
    pub state_change_id: Option<u64>,
    pub hash_r: Option<SecretHash>,
    pub r: Option<Secret>,
    /// Bumped on every write; full-row writers must present the version
    /// they read.
    pub version: u64,
}

impl CrossTransactionRecord {
    /// Fresh row for a swap-initiate message.
    pub fn from_request(request: &CrossTransaction) -> Self {
        Self {
            identifier: request.identifier,
            initiator_address: request.initiator_address,
            target_address: request.target_address,
            token_network_identifier: request.token_network_identifier,
            send_eth_amount: request.send_eth_amount,
            send_btc_amount: request.send_btc_amount,
            receive_btc_address: request.receive_btc_address.clone(),
            status: SwapStatus::Created,
            state_change_id: None,
            hash_r: None,
            r: None,
            version: 0,
        }
    }

    /// Transition to new status.
    pub fn transition_to(&mut self, new_status: SwapStatus) -> Result<(), SwapError> {
        if !self.status.can_transition_to(new_status) {
            return Err(SwapError::InvalidSwapTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", new_status),
            });
        }
        self.status = new_status;
        Ok(())
    }

    /// Record the preimage, checking it against any hashlock already known.
    pub fn reveal_secret(&mut self, secret: Secret) -> Result<(), SwapError> {
        let hash = secrethash(&secret);
        if let Some(expected) = self.hash_r {
            if expected != hash {
                return Err(SwapError::SecretMismatch);
            }
        }
        self.hash_r = Some(hash);
        self.r = Some(secret);
        Ok(())
    }

    /// The other party of the swap, seen from `me`.
    pub fn counterparty_of(&self, me: &Address) -> Address {
        if *me == self.initiator_address {
            self.target_address
        } else {
            self.initiator_address
        }
    }
}
