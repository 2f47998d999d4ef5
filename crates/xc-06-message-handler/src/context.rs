//! # Node Context
//!
//! Everything a handler may touch, passed explicitly to every handler.
//!
//! The write-ahead log sits behind a `parking_lot::Mutex`: one dispatch at
//! a time per node. The guard is always released before the next `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::{Address, BlockNumber, SecretHash, Signature, U256};
use tracing::{debug, warn};
use xc_01_wire_codec::Message;
use xc_02_cross_swap::{PaymentRequester, SwapLeg};
use xc_03_storage::{BincodeSerializer, KeyValueStore, StateSerializer, Storage, StorageError};
use xc_04_wal::WriteAheadLog;
use xc_05_transfer::{ChainState, Event, StateChange, TransferStateMachine};
use xc_telemetry::{COLLABORATOR_TIMEOUTS, EVENTS_PERSISTED, STATE_CHANGES_LOGGED};

use crate::domain::{queue_name, DispatchError};
use crate::events::emit_events;
use crate::ports::{MessageSigner, Transport};

/// Default bound on every collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// The node's write-ahead log over the transfer state machine.
pub type NodeWal<KV, S> = WriteAheadLog<TransferStateMachine, KV, S>;

/// Swap metadata for a locked transfer this node is about to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossPayment {
    pub identifier: U256,
    pub payment_string: String,
}

/// Capabilities handed to every message handler.
pub struct NodeContext<KV: KeyValueStore, S: StateSerializer = BincodeSerializer> {
    address: Address,
    signer: Arc<dyn MessageSigner>,
    transport: Arc<dyn Transport>,
    swap_leg: Arc<dyn SwapLeg>,
    payment_requester: Arc<dyn PaymentRequester>,
    wal: Mutex<NodeWal<KV, S>>,
    storage: Arc<Storage<KV, S>>,
    block_number: AtomicU64,
    collaborator_timeout: Duration,
    /// Locked transfers that go out wrapped as swap transfers, by secrethash.
    cross_payments: Mutex<HashMap<SecretHash, CrossPayment>>,
}

impl<KV: KeyValueStore, S: StateSerializer> NodeContext<KV, S> {
    pub fn new(
        wal: NodeWal<KV, S>,
        signer: Arc<dyn MessageSigner>,
        transport: Arc<dyn Transport>,
        swap_leg: Arc<dyn SwapLeg>,
        payment_requester: Arc<dyn PaymentRequester>,
    ) -> Self {
        let storage = Arc::clone(wal.storage());
        let block_number = wal.current_state().map_or(0, |state| state.block_number);
        Self {
            address: signer.address(),
            signer,
            transport,
            swap_leg,
            payment_requester,
            wal: Mutex::new(wal),
            storage,
            block_number: AtomicU64::new(block_number),
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            cross_payments: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn storage(&self) -> &Arc<Storage<KV, S>> {
        &self.storage
    }

    pub fn swap_leg(&self) -> &Arc<dyn SwapLeg> {
        &self.swap_leg
    }

    pub fn payment_requester(&self) -> &Arc<dyn PaymentRequester> {
        &self.payment_requester
    }

    pub fn collaborator_timeout(&self) -> Duration {
        self.collaborator_timeout
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number.load(Ordering::Acquire)
    }

    /// Run `f` against the current chain state (the initial state if
    /// nothing has been applied yet).
    pub fn with_chain_state<R>(&self, f: impl FnOnce(&ChainState) -> R) -> R {
        let wal = self.wal.lock();
        match wal.current_state() {
            Some(state) => f(state),
            None => f(&wal.machine().initial_state()),
        }
    }

    pub fn chain_state(&self) -> ChainState {
        self.with_chain_state(ChainState::clone)
    }

    /// Id of the last state change applied through this context's log.
    pub fn last_state_change_id(&self) -> Option<u64> {
        self.wal.lock().state_change_id()
    }

    // =========================================================================
    // STATE CHANGES
    // =========================================================================

    /// Log `change`, apply it, then put the resulting messages on the wire.
    pub async fn handle_state_change(
        &self,
        change: StateChange,
    ) -> Result<Vec<Event>, DispatchError> {
        self.log_state_change(change)
            .await
            .map(|(_, events)| events)
    }

    /// As [`handle_state_change`](Self::handle_state_change), also returning
    /// the id the change was logged under.
    pub async fn log_state_change(
        &self,
        change: StateChange,
    ) -> Result<(u64, Vec<Event>), DispatchError> {
        let kind = change.kind();
        let (state_change_id, events) = {
            let mut wal = self.wal.lock();
            let events = wal.log_and_dispatch(&change, self.block_number())?;
            let state_change_id = wal.state_change_id().ok_or_else(|| {
                StorageError::CorruptStorage("no state change id after dispatch".into())
            })?;
            (state_change_id, events)
        };
        STATE_CHANGES_LOGGED.with_label_values(&[kind]).inc();
        EVENTS_PERSISTED.inc_by(events.len() as f64);
        debug!(kind, state_change_id, events = events.len(), "State change handled");

        emit_events(self, &events).await;
        Ok((state_change_id, events))
    }

    /// Record a new block: advances the dispatch block number and logs it.
    pub async fn new_block(&self, block_number: BlockNumber) -> Result<(), DispatchError> {
        self.block_number.fetch_max(block_number, Ordering::AcqRel);
        self.handle_state_change(StateChange::Block { block_number })
            .await?;
        Ok(())
    }

    /// Re-send messages from replayed events that were never acknowledged.
    pub async fn resend_pending(&self, replayed: &[Event]) -> usize {
        let pending = self.with_chain_state(|state| state.pending_messages.clone());
        let unacked: Vec<Event> = replayed
            .iter()
            .filter(|event| match (event.recipient(), event.message_identifier()) {
                (Some(recipient), Some(id)) => pending
                    .iter()
                    .any(|p| p.recipient == recipient && p.message_identifier == id),
                _ => false,
            })
            .cloned()
            .collect();
        emit_events(self, &unacked).await;
        unacked.len()
    }

    /// Write a snapshot of the current state.
    pub fn snapshot(&self) -> Result<bool, DispatchError> {
        Ok(self.wal.lock().snapshot()?)
    }

    // =========================================================================
    // COLLABORATORS
    // =========================================================================

    /// Await `call`, giving up after the collaborator timeout.
    pub async fn bounded<T, F>(&self, collaborator: &'static str, call: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, DispatchError>>,
    {
        match tokio::time::timeout(self.collaborator_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                COLLABORATOR_TIMEOUTS.with_label_values(&[collaborator]).inc();
                warn!(collaborator, timeout = ?self.collaborator_timeout, "Collaborator call timed out");
                Err(DispatchError::CollaboratorTimeout(collaborator))
            }
        }
    }

    /// Fill in the trailing signature of `message` with the node key.
    pub async fn sign(&self, message: &mut Message) -> Result<(), DispatchError> {
        let signature = self.signature_for(message).await?;
        message.set_signature(signature);
        Ok(())
    }

    /// Node signature over the payload of `message`.
    pub async fn signature_for(&self, message: &Message) -> Result<Signature, DispatchError> {
        let payload = message.signed_payload()?;
        self.bounded("signer", self.signer.sign(&payload)).await
    }

    /// Queue an already signed message.
    pub async fn send(&self, recipient: Address, message: Message) -> Result<(), DispatchError> {
        let queue = queue_name(&message);
        debug!(
            kind = message.kind(),
            recipient = %shared_types::address_hex(&recipient),
            queue = %queue,
            "Sending message"
        );
        self.bounded(
            "transport",
            self.transport.send_async(recipient, &queue, message),
        )
        .await
    }

    pub async fn sign_and_send(
        &self,
        recipient: Address,
        mut message: Message,
    ) -> Result<(), DispatchError> {
        self.sign(&mut message).await?;
        self.send(recipient, message).await
    }

    // =========================================================================
    // SWAP TRANSFERS
    // =========================================================================

    /// Wrap the next locked transfer under `secrethash` as a swap transfer.
    pub fn register_cross_payment(&self, secrethash: SecretHash, payment: CrossPayment) {
        self.cross_payments.lock().insert(secrethash, payment);
    }

    pub(crate) fn take_cross_payment(&self, secrethash: &SecretHash) -> Option<CrossPayment> {
        self.cross_payments.lock().remove(secrethash)
    }
}
