//! # In-Process Network
//!
//! Nodes with in-memory storage whose `ChannelTransport`s are drained by
//! [`Network::run_until_quiet`], which hands every frame to the node owning
//! the recipient address.

use std::sync::Arc;

use shared_types::{Address, U256};
use tokio::sync::mpsc;
use xc_01_wire_codec::decode;
use xc_02_cross_swap::{CrossTransactionRecord, MockSwapLeg};
use xc_03_storage::{InMemoryKVStore, Storage};
use xc_04_wal::WriteAheadLog;
use xc_05_transfer::{ChannelEndState, ChannelState, ChannelStatus, StateChange, TransferStateMachine};
use xc_06_message_handler::{receive, ChannelTransport, Envelope, NodeContext, Secp256k1Signer};

/// Token network every test channel belongs to.
pub const TOKEN_NETWORK: Address = [0xee; 20];
pub const TOKEN: Address = [0xdd; 20];

/// Upper bound on frames per [`Network::run_until_quiet`] call.
const MAX_DELIVERIES: usize = 1_000;

pub fn chain_id() -> U256 {
    U256::from(337)
}

/// One node and its collaborators.
pub struct TestNode {
    pub ctx: NodeContext<InMemoryKVStore>,
    pub swap_leg: Arc<MockSwapLeg>,
    pub signer: Arc<Secp256k1Signer>,
}

impl TestNode {
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn swap(&self, identifier: U256) -> CrossTransactionRecord {
        self.ctx
            .storage()
            .get_crosstransaction_by_identifier(identifier)
            .unwrap()
    }
}

/// A frame handed from one node to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: Address,
    pub to: Address,
    pub kind: &'static str,
    pub handled: bool,
}

pub struct Network {
    nodes: Vec<TestNode>,
    outbound: Vec<mpsc::UnboundedReceiver<Envelope>>,
}

impl Network {
    pub fn new(size: usize) -> Self {
        let mut nodes = Vec::with_capacity(size);
        let mut outbound = Vec::with_capacity(size);
        for _ in 0..size {
            let signer = Arc::new(Secp256k1Signer::random());
            let storage = Arc::new(Storage::open(InMemoryKVStore::new()).unwrap());
            let machine = TransferStateMachine::new(signer.address(), chain_id());
            let (wal, _) = WriteAheadLog::restore(machine, storage).unwrap();
            let (transport, receiver) = ChannelTransport::new();
            let swap_leg = Arc::new(MockSwapLeg::default());
            let ctx = NodeContext::new(
                wal,
                signer.clone(),
                Arc::new(transport),
                swap_leg.clone(),
                swap_leg.clone(),
            );
            nodes.push(TestNode {
                ctx,
                swap_leg,
                signer,
            });
            outbound.push(receiver);
        }
        Self { nodes, outbound }
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    /// Open a channel between nodes `a` and `b`, both sides depositing `deposit`.
    pub async fn open_channel(&self, a: usize, b: usize, identifier: Address, deposit: u64) {
        let ends = [(a, b), (b, a)];
        for (us, partner) in ends {
            let channel = ChannelState {
                identifier,
                chain_id: chain_id(),
                token_network_identifier: TOKEN_NETWORK,
                token: TOKEN,
                our_state: ChannelEndState::new(self.nodes[us].address(), U256::from(deposit)),
                partner_state: ChannelEndState::new(
                    self.nodes[partner].address(),
                    U256::from(deposit),
                ),
                status: ChannelStatus::Opened,
            };
            self.nodes[us]
                .ctx
                .handle_state_change(StateChange::ActionNewChannel { channel })
                .await
                .unwrap();
        }
    }

    /// Deliver queued frames until no node has anything left to send.
    pub async fn run_until_quiet(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        loop {
            let mut progressed = false;
            for sender in 0..self.nodes.len() {
                while let Ok(envelope) = self.outbound[sender].try_recv() {
                    progressed = true;
                    let from = self.nodes[sender].address();
                    let kind = decode(&envelope.payload)
                        .map(|m| m.kind())
                        .unwrap_or("undecodable");
                    let handled = match self
                        .nodes
                        .iter()
                        .find(|n| n.address() == envelope.recipient)
                    {
                        Some(recipient) => receive(&recipient.ctx, &envelope.payload).await,
                        None => false,
                    };
                    deliveries.push(Delivery {
                        from,
                        to: envelope.recipient,
                        kind,
                        handled,
                    });
                    assert!(
                        deliveries.len() < MAX_DELIVERIES,
                        "network did not settle: {:?}",
                        &deliveries[deliveries.len() - 5..]
                    );
                }
            }
            if !progressed {
                return deliveries;
            }
        }
    }
}
