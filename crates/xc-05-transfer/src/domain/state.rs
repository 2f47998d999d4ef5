//! # Channel and Payment State
//!
//! Everything the transition function folds state changes into. All of it
//! is serialized into the snapshot, so collections are plain vectors.

use serde::{Deserialize, Serialize};
use shared_types::{keccak256, u256_to_bytes, Address, BlockNumber, Locksroot, Secret, SecretHash, U256, EMPTY_HASH};
use xc_01_wire_codec::Lock;

/// Whether a channel still accepts off-chain transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Opened,
    Closed,
}

/// Balance proof as carried by a transfer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProof {
    pub nonce: u64,
    pub transferred_amount: U256,
    pub locked_amount: U256,
    pub locksroot: Locksroot,
    pub channel_identifier: Address,
    pub token_network_identifier: Address,
    pub chain_id: U256,
}

/// One side of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndState {
    pub address: Address,
    pub deposit: U256,
    /// Latest balance proof sent by this end.
    pub balance_proof: Option<BalanceProof>,
    /// Locks this end has offered and not yet unlocked.
    pub pending_locks: Vec<Lock>,
}

impl ChannelEndState {
    pub fn new(address: Address, deposit: U256) -> Self {
        Self {
            address,
            deposit,
            balance_proof: None,
            pending_locks: Vec::new(),
        }
    }

    pub fn nonce(&self) -> u64 {
        self.balance_proof.as_ref().map_or(0, |bp| bp.nonce)
    }

    pub fn transferred_amount(&self) -> U256 {
        self.balance_proof
            .as_ref()
            .map_or_else(U256::zero, |bp| bp.transferred_amount)
    }

    pub fn locked_amount(&self) -> U256 {
        self.pending_locks
            .iter()
            .fold(U256::zero(), |acc, lock| acc.saturating_add(lock.amount))
    }

    pub fn lock_by_secrethash(&self, secrethash: &SecretHash) -> Option<&Lock> {
        self.pending_locks
            .iter()
            .find(|lock| &lock.secrethash == secrethash)
    }

    pub fn locksroot(&self) -> Locksroot {
        compute_locksroot(&self.pending_locks)
    }
}

/// Hash of a single lock: `keccak256(amount ‖ expiration ‖ secrethash)`.
pub fn lock_hash(lock: &Lock) -> [u8; 32] {
    let mut packed = Vec::with_capacity(96);
    packed.extend_from_slice(&u256_to_bytes(lock.amount));
    packed.extend_from_slice(&u256_to_bytes(lock.expiration));
    packed.extend_from_slice(&lock.secrethash);
    keccak256(&packed)
}

/// Root over the pending locks in insertion order; empty for no locks.
pub fn compute_locksroot(locks: &[Lock]) -> Locksroot {
    if locks.is_empty() {
        return EMPTY_HASH;
    }
    let mut leaves: Vec<[u8; 32]> = locks.iter().map(lock_hash).collect();
    while leaves.len() > 1 {
        leaves = leaves
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => keccak256(&[left.as_slice(), right.as_slice()].concat()),
                [single] => *single,
                _ => EMPTY_HASH,
            })
            .collect();
    }
    leaves[0]
}

/// A direct channel between this node and one partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub identifier: Address,
    pub chain_id: U256,
    pub token_network_identifier: Address,
    pub token: Address,
    pub our_state: ChannelEndState,
    pub partner_state: ChannelEndState,
    pub status: ChannelStatus,
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        self.status == ChannelStatus::Opened
    }

    pub fn partner(&self) -> Address {
        self.partner_state.address
    }

    /// What we can still send to the partner.
    pub fn our_distributable(&self) -> U256 {
        distributable(&self.our_state, &self.partner_state)
    }

    /// What the partner can still send to us.
    pub fn partner_distributable(&self) -> U256 {
        distributable(&self.partner_state, &self.our_state)
    }
}

/// `sender.deposit + receiver.transferred - sender.transferred - sender.locked`.
pub fn distributable(sender: &ChannelEndState, receiver: &ChannelEndState) -> U256 {
    sender
        .deposit
        .saturating_add(receiver.transferred_amount())
        .saturating_sub(sender.transferred_amount())
        .saturating_sub(sender.locked_amount())
}

/// Where this node sits on a mediated payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferRole {
    Initiator,
    Mediator,
    Target,
}

impl TransferRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferRole::Initiator => "initiator",
            TransferRole::Mediator => "mediator",
            TransferRole::Target => "target",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Lock offered or received; waiting for the secret.
    Pending,
    /// The secret is known to this node.
    SecretRevealed,
    /// The lock was settled off-chain.
    Unlocked,
    /// The payee sent the lock back.
    Refunded,
    /// Abandoned in favour of a new attempt.
    Cancelled,
}

/// A candidate next hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteState {
    pub node_address: Address,
    pub channel_identifier: Address,
}

/// A mediated payment this node takes part in, keyed by its secret hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTask {
    pub role: TransferRole,
    pub secrethash: SecretHash,
    pub payment_identifier: u64,
    pub amount: U256,
    pub initiator: Address,
    pub target: Address,
    pub secret: Option<Secret>,
    pub status: PaymentStatus,
    /// Channel the lock arrived on; `None` for the initiator.
    pub payer_channel: Option<Address>,
    /// Channel the lock was forwarded on; `None` for the target.
    pub payee_channel: Option<Address>,
    /// Remaining candidate hops for a retry after a refund.
    pub routes: Vec<RouteState>,
}

/// A sent message still waiting for `Processed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub recipient: Address,
    pub message_identifier: u64,
}

/// Root application state owned by the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub our_address: Address,
    pub chain_id: U256,
    pub block_number: BlockNumber,
    pub channels: Vec<ChannelState>,
    pub payments: Vec<PaymentTask>,
    pub pending_messages: Vec<PendingMessage>,
    message_counter: u64,
}

impl ChainState {
    pub fn new(our_address: Address, chain_id: U256, block_number: BlockNumber) -> Self {
        let seed = keccak256(&our_address);
        let mut head = [0u8; 8];
        head.copy_from_slice(&seed[..8]);
        Self {
            our_address,
            chain_id,
            block_number,
            channels: Vec::new(),
            payments: Vec::new(),
            pending_messages: Vec::new(),
            message_counter: u64::from_be_bytes(head),
        }
    }

    /// Next outbound message identifier; derived from state so replay
    /// produces the same identifiers.
    pub fn next_message_identifier(&mut self) -> u64 {
        self.message_counter = self.message_counter.wrapping_add(1);
        self.message_counter
    }

    pub fn channel(&self, identifier: &Address) -> Option<&ChannelState> {
        self.channels.iter().find(|c| &c.identifier == identifier)
    }

    pub fn channel_mut(&mut self, identifier: &Address) -> Option<&mut ChannelState> {
        self.channels.iter_mut().find(|c| &c.identifier == identifier)
    }

    pub fn payment(&self, secrethash: &SecretHash) -> Option<&PaymentTask> {
        self.payments
            .iter()
            .rev()
            .find(|p| &p.secrethash == secrethash)
    }

    pub fn payment_mut(&mut self, secrethash: &SecretHash) -> Option<&mut PaymentTask> {
        self.payments
            .iter_mut()
            .rev()
            .find(|p| &p.secrethash == secrethash)
    }
}
