//! Handler tests over two in-memory nodes wired by recording transports.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{address_hex, secrethash, Address, Secret, Signature, U256};
use xc_01_wire_codec::{
    AcceptCode, AcceptCross, CrossTransaction, CrossType, Message, Ping, RevealSecret,
};
use xc_02_cross_swap::{MockSwapLeg, SwapLegCall, SwapStatus};
use xc_03_storage::{InMemoryKVStore, Storage};
use xc_04_wal::WriteAheadLog;
use xc_05_transfer::{ChannelEndState, ChannelState, ChannelStatus, StateChange, TransferStateMachine};

use crate::context::NodeContext;
use crate::dispatcher::{on_message, receive};
use crate::ports::RecordingTransport;
use crate::swap::{
    on_secret_ready, resolve_secret, resume_parked_swaps, send_crosstransfer, start_swap,
};
use crate::{recover_sender, DispatchError, Secp256k1Signer};

const NET: Address = [0xee; 20];
const TOKEN: Address = [0xdd; 20];
const CHANNEL: Address = [0xc1; 20];
const SECRET: Secret = [7u8; 32];
const INVOICE: &str = "lnbc300n1pexample";

struct TestNode {
    ctx: NodeContext<InMemoryKVStore>,
    transport: Arc<RecordingTransport>,
    swap_leg: Arc<MockSwapLeg>,
    signer: Arc<Secp256k1Signer>,
}

impl TestNode {
    fn new(transport: RecordingTransport) -> Self {
        let signer = Arc::new(Secp256k1Signer::random());
        let storage = Arc::new(Storage::open(InMemoryKVStore::new()).unwrap());
        let machine = TransferStateMachine::new(signer.address(), chain_id());
        let (wal, _) = WriteAheadLog::restore(machine, storage).unwrap();
        let transport = Arc::new(transport);
        let swap_leg = Arc::new(MockSwapLeg::default());
        let ctx = NodeContext::new(
            wal,
            signer.clone(),
            transport.clone(),
            swap_leg.clone(),
            swap_leg.clone(),
        );
        Self {
            ctx,
            transport,
            swap_leg,
            signer,
        }
    }

    fn address(&self) -> Address {
        self.signer.address()
    }

    fn signed(&self, mut message: Message) -> Message {
        self.signer.sign_message(&mut message).unwrap();
        message
    }

    fn status(&self) -> SwapStatus {
        self.ctx
            .storage()
            .get_crosstransaction_by_identifier(swap_id())
            .unwrap()
            .status
    }

    /// Drain sent messages, keeping only those of `kind`.
    fn take_kind(&self, kind: &str) -> Vec<Message> {
        self.transport
            .take()
            .into_iter()
            .map(|sent| sent.message)
            .filter(|m| m.kind() == kind)
            .collect()
    }
}

fn chain_id() -> U256 {
    U256::from(337)
}

fn swap_id() -> U256 {
    U256::from(0x5a5a_u64)
}

fn swap_request(initiator: Address, target: Address, cross_type: CrossType) -> CrossTransaction {
    CrossTransaction {
        message_identifier: 9,
        initiator_address: initiator,
        target_address: target,
        token_network_identifier: NET,
        send_eth_amount: U256::from(30),
        send_btc_amount: U256::from(1000),
        receive_btc_address: "tb1qexample".into(),
        cross_type,
        identifier: swap_id(),
        signature: Signature::EMPTY,
    }
}

fn accept(initiator: Address, target: Address, code: AcceptCode) -> Message {
    Message::AcceptCross(AcceptCross {
        message_identifier: 11,
        initiator_address: initiator,
        target_address: target,
        identifier: swap_id(),
        accept: code,
        signature: Signature::EMPTY,
    })
}

async fn open_channel(a: &TestNode, b: &TestNode) {
    for (us, partner, node) in [(a.address(), b.address(), a), (b.address(), a.address(), b)] {
        let channel = ChannelState {
            identifier: CHANNEL,
            chain_id: chain_id(),
            token_network_identifier: NET,
            token: TOKEN,
            our_state: ChannelEndState::new(us, U256::from(100)),
            partner_state: ChannelEndState::new(partner, U256::from(100)),
            status: ChannelStatus::Opened,
        };
        node.ctx
            .handle_state_change(StateChange::ActionNewChannel { channel })
            .await
            .unwrap();
    }
}

/// A originates the swap, B accepts, A is left in `Accepted`.
async fn negotiate(a: &TestNode, b: &TestNode) {
    let local = swap_request(a.address(), b.address(), CrossType::LocalOrigin);
    start_swap(&a.ctx, local).await.unwrap();

    let forwarded = a.take_kind("cross_transaction").remove(0);
    assert!(on_message(&b.ctx, forwarded).await);

    let accept = b.take_kind("accept_cross").remove(0);
    assert!(on_message(&a.ctx, accept).await);
    assert_eq!(a.status(), SwapStatus::Accepted);
}

/// Negotiated swap with the funding transfer delivered to B.
async fn lock_swap(a: &TestNode, b: &TestNode) {
    open_channel(a, b).await;
    negotiate(a, b).await;
    send_crosstransfer(&a.ctx, swap_id(), SECRET, INVOICE.into(), U256::from(500))
        .await
        .unwrap();
    let transfer = a.take_kind("cross_locked_transfer").remove(0);
    assert!(on_message(&b.ctx, transfer).await);
}

// =============================================================================
// INBOUND FILTERING
// =============================================================================

#[tokio::test]
async fn test_ping_has_no_handler() {
    let a = TestNode::new(RecordingTransport::default());
    let ping = a.signed(Message::Ping(Ping {
        nonce: 1,
        signature: Signature::EMPTY,
    }));
    assert!(!on_message(&a.ctx, ping).await);
    assert!(a.transport.sent().is_empty());
}

#[tokio::test]
async fn test_undecodable_bytes_are_dropped() {
    let a = TestNode::new(RecordingTransport::default());
    assert!(!receive(&a.ctx, &[0xff, 0x00, 0x01]).await);
    assert!(!receive(&a.ctx, &[]).await);
}

#[tokio::test]
async fn test_unsigned_channel_message_is_dropped() {
    let a = TestNode::new(RecordingTransport::default());
    let reveal = Message::RevealSecret(RevealSecret {
        message_identifier: 3,
        secret: SECRET,
        signature: Signature::EMPTY,
    });
    assert!(!on_message(&a.ctx, reveal).await);
    assert_eq!(a.ctx.last_state_change_id(), None);
}

#[tokio::test]
async fn test_signed_channel_message_is_logged() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let reveal = b.signed(Message::RevealSecret(RevealSecret {
        message_identifier: 3,
        secret: SECRET,
        signature: Signature::EMPTY,
    }));
    let bytes = xc_01_wire_codec::encode(&reveal).unwrap();
    assert!(receive(&a.ctx, &bytes).await);
    assert_eq!(a.ctx.last_state_change_id(), Some(1));
}

// =============================================================================
// SWAP NEGOTIATION
// =============================================================================

#[tokio::test]
async fn test_remote_swap_initiate_is_accepted() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let request = a.signed(Message::CrossTransaction(swap_request(
        a.address(),
        b.address(),
        CrossType::Remote,
    )));

    assert!(on_message(&b.ctx, request).await);
    assert_eq!(b.status(), SwapStatus::AcceptSent);

    let sent = b.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, a.address());
    let Message::AcceptCross(reply) = &sent[0].message else {
        panic!("expected accept, got {:?}", sent[0].message);
    };
    assert_eq!(reply.accept, AcceptCode::Accept);
    assert_eq!(reply.identifier, swap_id());
    assert_eq!(recover_sender(&sent[0].message).unwrap(), b.address());
}

#[tokio::test]
async fn test_swap_initiate_from_impostor_is_dropped() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let mallory = TestNode::new(RecordingTransport::default());
    let request = mallory.signed(Message::CrossTransaction(swap_request(
        a.address(),
        b.address(),
        CrossType::Remote,
    )));

    assert!(!on_message(&b.ctx, request).await);
    assert!(b.ctx.storage().get_crosstransaction_by_identifier(swap_id()).is_err());
    assert!(b.transport.sent().is_empty());
}

#[tokio::test]
async fn test_duplicate_swap_identifier_is_dropped() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let request = a.signed(Message::CrossTransaction(swap_request(
        a.address(),
        b.address(),
        CrossType::Remote,
    )));

    assert!(on_message(&b.ctx, request.clone()).await);
    assert!(!on_message(&b.ctx, request).await);
    assert_eq!(b.take_kind("accept_cross").len(), 1);
    assert_eq!(b.status(), SwapStatus::AcceptSent);
}

#[tokio::test]
async fn test_local_swap_is_forwarded_and_started() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let local = swap_request(a.address(), b.address(), CrossType::LocalOrigin);

    start_swap(&a.ctx, local).await.unwrap();
    assert_eq!(a.status(), SwapStatus::Created);

    let sent = a.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, b.address());
    let Message::CrossTransaction(forwarded) = &sent[0].message else {
        panic!("expected swap-initiate, got {:?}", sent[0].message);
    };
    assert_eq!(forwarded.cross_type, CrossType::Remote);
    assert_eq!(recover_sender(&sent[0].message).unwrap(), a.address());
    assert_eq!(
        a.swap_leg.calls(),
        vec![SwapLegCall::StartCrosstransaction(swap_id())]
    );
}

#[tokio::test]
async fn test_local_swap_from_network_is_dropped() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let mallory = TestNode::new(RecordingTransport::default());

    // Signed or not, a local-origin request off the wire starts nothing.
    let unsigned = Message::CrossTransaction(swap_request(
        a.address(),
        b.address(),
        CrossType::LocalOrigin,
    ));
    let signed = mallory.signed(Message::CrossTransaction(swap_request(
        a.address(),
        mallory.address(),
        CrossType::LocalOrigin,
    )));
    for message in [unsigned.clone(), signed] {
        assert!(!on_message(&a.ctx, message).await);
    }
    let bytes = xc_01_wire_codec::encode(&unsigned).unwrap();
    assert!(!receive(&a.ctx, &bytes).await);

    assert!(a.ctx.storage().get_crosstransaction_by_identifier(swap_id()).is_err());
    assert!(a.transport.sent().is_empty());
    assert!(a.swap_leg.calls().is_empty());
}

#[tokio::test]
async fn test_start_swap_for_another_initiator_is_refused() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let foreign = swap_request(b.address(), a.address(), CrossType::LocalOrigin);

    let err = start_swap(&a.ctx, foreign).await.unwrap_err();
    assert!(matches!(err, DispatchError::Rejected(_)));
    assert_eq!(err.reason(), "rejected");
    assert!(a.ctx.storage().get_crosstransaction_by_identifier(swap_id()).is_err());
    assert!(a.transport.sent().is_empty());
    assert!(a.swap_leg.calls().is_empty());
}

#[tokio::test]
async fn test_accept_moves_initiator_and_starts_transfer() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    negotiate(&a, &b).await;
    assert_eq!(
        a.swap_leg.calls(),
        vec![
            SwapLegCall::StartCrosstransaction(swap_id()),
            SwapLegCall::StartSendCrosstransfer(swap_id()),
        ]
    );
}

#[tokio::test]
async fn test_accept_from_stranger_is_dropped() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let mallory = TestNode::new(RecordingTransport::default());
    let local = swap_request(a.address(), b.address(), CrossType::LocalOrigin);
    start_swap(&a.ctx, local).await.unwrap();

    let forged = mallory.signed(accept(a.address(), b.address(), AcceptCode::Accept));
    assert!(!on_message(&a.ctx, forged).await);
    assert_eq!(a.status(), SwapStatus::Created);
}

#[tokio::test]
async fn test_sync_ack_closes_swap_without_collaborator_call() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let local = swap_request(a.address(), b.address(), CrossType::LocalOrigin);
    start_swap(&a.ctx, local).await.unwrap();

    let ack = b.signed(accept(a.address(), b.address(), AcceptCode::SyncAck));
    assert!(on_message(&a.ctx, ack).await);
    assert_eq!(a.status(), SwapStatus::Synced);
    assert_eq!(
        a.swap_leg.calls(),
        vec![SwapLegCall::StartCrosstransaction(swap_id())]
    );
}

#[tokio::test]
async fn test_stalled_transport_times_out() {
    let a = TestNode::new(RecordingTransport::default());
    let mut b = TestNode::new(RecordingTransport::stalled());
    b.ctx = b.ctx.with_collaborator_timeout(Duration::from_millis(50));
    let request = a.signed(Message::CrossTransaction(swap_request(
        a.address(),
        b.address(),
        CrossType::Remote,
    )));

    assert!(!on_message(&b.ctx, request).await);
    // The row update is durable even though the accept never left.
    assert_eq!(b.status(), SwapStatus::AcceptSent);
}

// =============================================================================
// SWAP SETTLEMENT
// =============================================================================

#[tokio::test]
async fn test_swap_transfer_locks_responder_row() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    lock_swap(&a, &b).await;

    let row = b
        .ctx
        .storage()
        .get_crosstransaction_by_identifier(swap_id())
        .unwrap();
    assert_eq!(row.status, SwapStatus::Locked);
    assert_eq!(row.hash_r, Some(secrethash(&SECRET)));
    assert_eq!(
        b.swap_leg.calls(),
        vec![
            SwapLegCall::ReceivedLockedTransfer {
                identifier: swap_id(),
                secrethash: secrethash(&SECRET),
            },
            SwapLegCall::PaymentRequest(INVOICE.into()),
        ]
    );

    let sent = b.transport.sent();
    let kinds: Vec<&str> = sent.iter().map(|s| s.message.kind()).collect();
    assert_eq!(kinds, vec!["processed", "cross_secret_request"]);
    assert!(sent.iter().all(|s| s.recipient == a.address()));
}

#[tokio::test]
async fn test_expired_swap_transfer_leaves_row_unlocked() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    open_channel(&a, &b).await;
    negotiate(&a, &b).await;
    b.ctx.new_block(1000).await.unwrap();
    b.transport.take();

    send_crosstransfer(&a.ctx, swap_id(), SECRET, INVOICE.into(), U256::from(500))
        .await
        .unwrap();
    let transfer = a.take_kind("cross_locked_transfer").remove(0);
    assert!(!on_message(&b.ctx, transfer).await);

    let row = b
        .ctx
        .storage()
        .get_crosstransaction_by_identifier(swap_id())
        .unwrap();
    assert_eq!(row.status, SwapStatus::AcceptSent);
    assert_eq!(row.hash_r, None);
    assert!(b
        .ctx
        .storage()
        .get_crosstransaction_by_r(&secrethash(&SECRET))
        .is_err());
    assert!(b.swap_leg.calls().is_empty());
    assert!(b.take_kind("cross_secret_request").is_empty());
}

#[tokio::test]
async fn test_swap_transfer_travels_on_channel_queue() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    open_channel(&a, &b).await;
    negotiate(&a, &b).await;
    send_crosstransfer(&a.ctx, swap_id(), SECRET, INVOICE.into(), U256::from(500))
        .await
        .unwrap();

    let sent = a.transport.sent();
    let transfer = sent
        .iter()
        .find(|s| s.message.kind() == "cross_locked_transfer")
        .unwrap();
    assert_eq!(transfer.queue, address_hex(&CHANNEL));
    assert_eq!(transfer.recipient, b.address());
}

#[tokio::test]
async fn test_secret_request_parked_until_secret_ready() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    lock_swap(&a, &b).await;

    let request = b.take_kind("cross_secret_request").remove(0);
    let before = a.ctx.last_state_change_id();
    assert!(on_message(&a.ctx, request).await);

    let row = a
        .ctx
        .storage()
        .get_crosstransaction_by_identifier(swap_id())
        .unwrap();
    assert_eq!(row.status, SwapStatus::SecretRequestPending);
    assert!(row.state_change_id.is_some());
    // Parked, not applied.
    assert_eq!(a.ctx.last_state_change_id(), before);
    assert!(a.take_kind("reveal_secret").is_empty());

    assert_eq!(resolve_secret(&a.ctx, SECRET).await.unwrap(), swap_id());
    assert_eq!(a.status(), SwapStatus::Synced);

    let sent = a.transport.take();
    let reveal = sent
        .iter()
        .find(|s| s.message.kind() == "reveal_secret")
        .unwrap();
    assert_eq!(reveal.recipient, b.address());
    let ack = sent
        .iter()
        .find(|s| s.message.kind() == "accept_cross")
        .unwrap();
    assert_eq!(ack.recipient, b.address());

    // B closes its side on the sync-ack.
    assert!(on_message(&b.ctx, ack.message.clone()).await);
    assert_eq!(b.status(), SwapStatus::Synced);
}

#[tokio::test]
async fn test_secret_request_applied_when_secret_already_ready() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    lock_swap(&a, &b).await;

    on_secret_ready(&a.ctx, swap_id(), SECRET).await.unwrap();
    assert_eq!(a.status(), SwapStatus::SecretReady);
    a.transport.take();

    let request = b.take_kind("cross_secret_request").remove(0);
    assert!(on_message(&a.ctx, request).await);
    assert_eq!(a.status(), SwapStatus::Synced);

    let kinds: Vec<&str> = a
        .transport
        .sent()
        .iter()
        .map(|s| s.message.kind())
        .collect();
    assert_eq!(kinds, vec!["reveal_secret", "accept_cross"]);
}

/// A parks B's secret request, then stops after writing SECRET_READY but
/// before releasing the request.
async fn stop_between_secret_ready_and_release(a: &TestNode, b: &TestNode) -> u64 {
    lock_swap(a, b).await;
    let request = b.take_kind("cross_secret_request").remove(0);
    assert!(on_message(&a.ctx, request).await);

    let row = a
        .ctx
        .storage()
        .update_crosstransaction(swap_id(), |row| {
            row.reveal_secret(SECRET)?;
            row.transition_to(SwapStatus::SecretReady)?;
            Ok::<_, DispatchError>(())
        })
        .unwrap();
    a.transport.take();
    row.state_change_id.unwrap()
}

#[tokio::test]
async fn test_repeated_secret_ready_releases_parked_request() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    let parked_id = stop_between_secret_ready_and_release(&a, &b).await;
    assert_eq!(a.status(), SwapStatus::SecretReady);

    on_secret_ready(&a.ctx, swap_id(), SECRET).await.unwrap();
    assert_eq!(a.status(), SwapStatus::Synced);
    let kinds: Vec<&str> = a
        .transport
        .sent()
        .iter()
        .map(|s| s.message.kind())
        .collect();
    assert_eq!(kinds, vec!["reveal_secret", "accept_cross"]);
    assert!(a
        .ctx
        .storage()
        .get_parked_state_change::<StateChange>(parked_id)
        .is_err());
}

#[tokio::test]
async fn test_resume_finishes_stuck_secret_ready_rows() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    stop_between_secret_ready_and_release(&a, &b).await;

    assert_eq!(resume_parked_swaps(&a.ctx).await.unwrap(), 1);
    assert_eq!(a.status(), SwapStatus::Synced);
    assert_eq!(a.take_kind("reveal_secret").len(), 1);

    // Nothing left to resume.
    assert_eq!(resume_parked_swaps(&a.ctx).await.unwrap(), 0);
    assert!(a.transport.sent().is_empty());
}

#[tokio::test]
async fn test_repeated_secret_ready_without_request_is_harmless() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    lock_swap(&a, &b).await;

    on_secret_ready(&a.ctx, swap_id(), SECRET).await.unwrap();
    on_secret_ready(&a.ctx, swap_id(), SECRET).await.unwrap();
    assert_eq!(a.status(), SwapStatus::SecretReady);
    assert_eq!(resume_parked_swaps(&a.ctx).await.unwrap(), 0);
    assert!(on_secret_ready(&a.ctx, swap_id(), [9u8; 32]).await.is_err());
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    lock_swap(&a, &b).await;

    assert!(on_secret_ready(&a.ctx, swap_id(), [9u8; 32]).await.is_err());
    assert_eq!(a.status(), SwapStatus::Accepted);
}

#[tokio::test]
async fn test_resend_pending_after_restart() {
    let a = TestNode::new(RecordingTransport::default());
    let b = TestNode::new(RecordingTransport::default());
    lock_swap(&a, &b).await;
    b.transport.take();

    // Rebuild B from its own storage; the secret request is unacknowledged.
    let storage = Arc::clone(b.ctx.storage());
    let machine = TransferStateMachine::new(b.address(), chain_id());
    let (wal, replayed) = WriteAheadLog::restore(machine, storage).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let restarted = NodeContext::new(
        wal,
        b.signer.clone(),
        transport.clone(),
        b.swap_leg.clone(),
        b.swap_leg.clone(),
    );

    assert_eq!(restarted.resend_pending(&replayed).await, 1);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message.kind(), "cross_secret_request");
}
