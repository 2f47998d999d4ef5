use super::*;
use crate::domain::{ChannelEndState, ChannelStatus};
use crate::routing::get_best_routes;
use crate::views::get_transfer_role;

const NET: Address = [0xee; 20];
const TOKEN: Address = [0xdd; 20];
const A: Address = [0xaa; 20];
const B: Address = [0xbb; 20];
const C: Address = [0xcc; 20];

fn chain_id() -> U256 {
    U256::from(337)
}

fn channel(identifier: Address, us: Address, partner: Address, deposit: u64) -> ChannelState {
    ChannelState {
        identifier,
        chain_id: chain_id(),
        token_network_identifier: NET,
        token: TOKEN,
        our_state: ChannelEndState::new(us, U256::from(deposit)),
        partner_state: ChannelEndState::new(partner, U256::from(deposit)),
        status: ChannelStatus::Opened,
    }
}

fn node(us: Address, channels: &[(Address, Address)]) -> ChainState {
    let mut state = ChainState::new(us, chain_id(), 10);
    for (identifier, partner) in channels {
        state_transition(
            &mut state,
            &StateChange::ActionNewChannel {
                channel: channel(*identifier, us, *partner, 100),
            },
        );
    }
    state
}

fn take_locked(events: &[Event]) -> LockedTransferState {
    events
        .iter()
        .find_map(|event| match event {
            Event::SendLockedTransfer { transfer, .. } => Some(transfer.clone()),
            _ => None,
        })
        .expect("locked transfer event")
}

fn start_payment(state: &mut ChainState, target: Address, secret: Secret, amount: u64) -> Vec<Event> {
    let routes = get_best_routes(state, &NET, &state.our_address.clone(), &target, U256::from(amount), None);
    state_transition(
        state,
        &StateChange::ActionInitInitiator {
            token_network_identifier: NET,
            payment_identifier: 77,
            amount: U256::from(amount),
            target,
            secret,
            expiration: U256::from(500),
            routes,
        },
    )
}

#[test]
fn test_state_machine_starts_from_empty_state() {
    let machine = TransferStateMachine::new(A, chain_id());
    let out = machine.transition(None, &StateChange::Block { block_number: 42 });
    assert_eq!(out.new_state.our_address, A);
    assert_eq!(out.new_state.block_number, 42);
    assert!(out.events.is_empty());
}

#[test]
fn test_block_number_never_regresses() {
    let mut state = node(A, &[]);
    state_transition(&mut state, &StateChange::Block { block_number: 50 });
    state_transition(&mut state, &StateChange::Block { block_number: 20 });
    assert_eq!(state.block_number, 50);
}

#[test]
fn test_direct_payment_between_two_nodes() {
    let ch = [0xc1; 20];
    let mut a = node(A, &[(ch, B)]);
    let mut b = node(B, &[(ch, A)]);
    let secret = [5u8; 32];
    let secrethash = keccak256(&secret);

    // A offers the lock.
    let events = start_payment(&mut a, B, secret, 30);
    let transfer = take_locked(&events);
    assert_eq!(transfer.balance_proof.nonce, 1);
    assert_eq!(transfer.balance_proof.locked_amount, U256::from(30));
    assert_eq!(get_transfer_role(&a, &secrethash), Some(TransferRole::Initiator));

    // B accepts it as target and asks A for the secret.
    let events = state_transition(&mut b, &StateChange::ActionInitTarget { sender: A, transfer: transfer.clone() });
    assert!(matches!(events[0], Event::SendProcessed { recipient: A, .. }));
    let Event::SendSecretRequest { recipient, amount, secrethash: requested, payment_identifier, .. } = events[1].clone() else {
        panic!("expected secret request, got {:?}", events);
    };
    assert_eq!((recipient, amount, requested, payment_identifier), (A, U256::from(30), secrethash, 77));

    // A reveals.
    let events = state_transition(
        &mut a,
        &StateChange::ReceiveSecretRequest { payment_identifier: 77, amount: U256::from(30), secrethash, sender: B },
    );
    assert!(matches!(events[0], Event::SendRevealSecret { recipient: B, secret: s, .. } if s == secret));

    // B reveals back to its payer.
    let events = state_transition(&mut b, &StateChange::ReceiveSecretReveal { secret, sender: A });
    assert!(matches!(events[0], Event::SendRevealSecret { recipient: A, .. }));

    // A unlocks.
    let events = state_transition(&mut a, &StateChange::ReceiveSecretReveal { secret, sender: B });
    let Event::SendUnlock { message_identifier, balance_proof, .. } = events[0].clone() else {
        panic!("expected unlock, got {:?}", events);
    };
    assert!(events.iter().any(|e| matches!(e, Event::EventPaymentSentSuccess { .. })));
    assert_eq!(balance_proof.transferred_amount, U256::from(30));
    assert_eq!(balance_proof.locked_amount, U256::zero());

    // B validates the unlock.
    let events = state_transition(
        &mut b,
        &StateChange::ReceiveUnlock { message_identifier, secret, sender: A, balance_proof },
    );
    assert!(events.iter().any(|e| matches!(
        e,
        Event::EventPaymentReceivedSuccess { amount, initiator: A, .. } if *amount == U256::from(30)
    )));

    let b_channel = b.channel(&ch).unwrap();
    assert_eq!(b_channel.partner_state.transferred_amount(), U256::from(30));
    assert!(b_channel.partner_state.pending_locks.is_empty());
    assert_eq!(b_channel.our_distributable(), U256::from(130));
    assert_eq!(a.channel(&ch).unwrap().our_distributable(), U256::from(70));
}

#[test]
fn test_replayed_transfer_is_rejected() {
    let ch = [0xc1; 20];
    let mut a = node(A, &[(ch, B)]);
    let mut b = node(B, &[(ch, A)]);
    let transfer = take_locked(&start_payment(&mut a, B, [1; 32], 10));

    state_transition(&mut b, &StateChange::ActionInitTarget { sender: A, transfer: transfer.clone() });
    let events = state_transition(&mut b, &StateChange::ActionInitTarget { sender: A, transfer });
    assert!(matches!(
        &events[0],
        Event::EventInvalidReceivedLockedTransfer { reason, .. } if reason.contains("nonce")
    ));
}

#[test]
fn test_locked_transfer_from_stranger_is_rejected() {
    let ch = [0xc1; 20];
    let mut a = node(A, &[(ch, B)]);
    let mut b = node(B, &[(ch, A)]);
    let transfer = take_locked(&start_payment(&mut a, B, [1; 32], 10));

    let events = state_transition(&mut b, &StateChange::ActionInitTarget { sender: C, transfer });
    assert!(matches!(
        &events[0],
        Event::EventInvalidReceivedLockedTransfer { reason, .. } if reason.contains("partner")
    ));
    assert!(b.payments.is_empty());
}

#[test]
fn test_expired_lock_is_rejected() {
    let ch = [0xc1; 20];
    let mut a = node(A, &[(ch, B)]);
    let mut b = node(B, &[(ch, A)]);
    let transfer = take_locked(&start_payment(&mut a, B, [1; 32], 10));
    state_transition(&mut b, &StateChange::Block { block_number: 600 });

    let events = state_transition(&mut b, &StateChange::ActionInitTarget { sender: A, transfer });
    assert!(matches!(
        &events[0],
        Event::EventInvalidReceivedLockedTransfer { reason, .. } if reason.contains("expired")
    ));
}

#[test]
fn test_initiator_without_route_fails() {
    let mut a = node(A, &[([0xc1; 20], B)]);
    let events = start_payment(&mut a, B, [1; 32], 1_000);
    assert!(matches!(&events[0], Event::EventPaymentSentFailed { .. }));
    assert!(a.payments.is_empty());
}

#[test]
fn test_secret_request_from_wrong_node_is_invalid() {
    let mut a = node(A, &[([0xc1; 20], B)]);
    let secret = [3; 32];
    start_payment(&mut a, B, secret, 10);
    let events = state_transition(
        &mut a,
        &StateChange::ReceiveSecretRequest {
            payment_identifier: 77,
            amount: U256::from(10),
            secrethash: keccak256(&secret),
            sender: C,
        },
    );
    assert!(matches!(&events[0], Event::EventInvalidSecretRequest { .. }));
}

#[test]
fn test_mediator_forwards_and_unlocks() {
    let ab = [0xab; 20];
    let bc = [0xbc; 20];
    let mut a = node(A, &[(ab, B)]);
    let mut b = node(B, &[(ab, A), (bc, C)]);
    let mut c = node(C, &[(bc, B)]);
    let secret = [8; 32];

    let to_b = take_locked(&start_payment(&mut a, C, secret, 25));
    let routes = get_best_routes(&b, &NET, &B, &C, U256::from(25), Some(&A));
    let events = state_transition(&mut b, &StateChange::ActionInitMediator { sender: A, routes, transfer: to_b });
    let to_c = take_locked(&events);
    assert_eq!(to_c.balance_proof.channel_identifier, bc);
    assert_eq!(to_c.initiator, A);
    assert_eq!(get_transfer_role(&b, &keccak256(&secret)), Some(TransferRole::Mediator));

    state_transition(&mut c, &StateChange::ActionInitTarget { sender: B, transfer: to_c });
    state_transition(&mut c, &StateChange::ReceiveSecretReveal { secret, sender: A });

    // C reveals to B; B unlocks toward C and reveals to A.
    let events = state_transition(&mut b, &StateChange::ReceiveSecretReveal { secret, sender: C });
    let Event::SendUnlock { recipient, message_identifier, balance_proof, .. } = events[0].clone() else {
        panic!("expected unlock, got {:?}", events);
    };
    assert_eq!(recipient, C);
    assert!(matches!(events[1], Event::SendRevealSecret { recipient: A, .. }));

    let events = state_transition(
        &mut c,
        &StateChange::ReceiveUnlock { message_identifier, secret, sender: B, balance_proof },
    );
    assert!(events.iter().any(|e| matches!(e, Event::EventPaymentReceivedSuccess { initiator: A, .. })));
}

#[test]
fn test_mediator_without_route_refunds_payer() {
    let ab = [0xab; 20];
    let mut a = node(A, &[(ab, B)]);
    let mut b = node(B, &[(ab, A)]);

    let to_b = take_locked(&start_payment(&mut a, C, [2; 32], 10));
    let events = state_transition(&mut b, &StateChange::ActionInitMediator { sender: A, routes: Vec::new(), transfer: to_b });
    let refund = events
        .iter()
        .find_map(|e| match e {
            Event::SendRefundTransfer { recipient, transfer } => Some((*recipient, transfer.clone())),
            _ => None,
        })
        .expect("refund");
    assert_eq!(refund.0, A);

    // The initiator cancels and retries under a fresh secret, but has no other route.
    let events = state_transition(
        &mut a,
        &StateChange::ReceiveTransferRefundCancelRoute {
            sender: B,
            routes: Vec::new(),
            transfer: refund.1,
            secret: [9; 32],
        },
    );
    assert!(matches!(events[0], Event::SendProcessed { recipient: B, .. }));
    assert!(matches!(&events[1], Event::EventPaymentSentFailed { .. }));
    assert_eq!(a.payment(&keccak256(&[2; 32])).unwrap().status, PaymentStatus::Cancelled);
}

#[test]
fn test_refund_cancel_route_retries_on_next_channel() {
    let ab = [0xab; 20];
    let ac = [0xac; 20];
    let mut a = node(A, &[(ab, B), (ac, C)]);
    let mut b = node(B, &[(ab, A)]);

    let routes = vec![
        RouteState { node_address: B, channel_identifier: ab },
        RouteState { node_address: C, channel_identifier: ac },
    ];
    let events = state_transition(
        &mut a,
        &StateChange::ActionInitInitiator {
            token_network_identifier: NET,
            payment_identifier: 5,
            amount: U256::from(10),
            target: [0x99; 20],
            secret: [2; 32],
            expiration: U256::from(500),
            routes,
        },
    );
    let to_b = take_locked(&events);
    let events = state_transition(&mut b, &StateChange::ActionInitMediator { sender: A, routes: Vec::new(), transfer: to_b });
    let Some(Event::SendRefundTransfer { transfer: refund, .. }) = events.last().cloned() else {
        panic!("expected refund, got {:?}", events);
    };

    let events = state_transition(
        &mut a,
        &StateChange::ReceiveTransferRefundCancelRoute { sender: B, routes: Vec::new(), transfer: refund, secret: [4; 32] },
    );
    let Event::SendLockedTransfer { recipient, transfer } = events[1].clone() else {
        panic!("expected retry, got {:?}", events);
    };
    assert_eq!(recipient, C);
    assert_eq!(transfer.lock.secrethash, keccak256(&[4; 32]));
    assert_eq!(get_transfer_role(&a, &keccak256(&[4; 32])), Some(TransferRole::Initiator));
}

#[test]
fn test_direct_transfer_validation() {
    let ch = [0xc1; 20];
    let mut b = node(B, &[(ch, A)]);
    let proof = |nonce: u64, transferred: u64| BalanceProof {
        nonce,
        transferred_amount: U256::from(transferred),
        locked_amount: U256::zero(),
        locksroot: compute_locksroot(&[]),
        channel_identifier: ch,
        token_network_identifier: NET,
        chain_id: chain_id(),
    };
    let direct = |nonce: u64, transferred: u64| StateChange::ReceiveTransferDirect {
        token_network_identifier: NET,
        message_identifier: nonce,
        payment_identifier: 1,
        sender: A,
        balance_proof: proof(nonce, transferred),
    };

    let events = state_transition(&mut b, &direct(1, 40));
    assert!(matches!(
        &events[1],
        Event::EventPaymentReceivedSuccess { amount, .. } if *amount == U256::from(40)
    ));

    // Same nonce again.
    let events = state_transition(&mut b, &direct(1, 50));
    assert!(matches!(&events[0], Event::EventTransferReceivedInvalidDirectTransfer { reason, .. } if reason.contains("nonce")));

    // More than the partner's deposit.
    let events = state_transition(&mut b, &direct(2, 400));
    assert!(matches!(&events[0], Event::EventTransferReceivedInvalidDirectTransfer { .. }));

    let events = state_transition(&mut b, &direct(2, 55));
    assert!(matches!(
        &events[1],
        Event::EventPaymentReceivedSuccess { amount, .. } if *amount == U256::from(15)
    ));
}

#[test]
fn test_processed_clears_pending_message() {
    let mut a = node(A, &[([0xc1; 20], B)]);
    let transfer = take_locked(&start_payment(&mut a, B, [1; 32], 10));
    assert_eq!(a.pending_messages.len(), 1);

    state_transition(
        &mut a,
        &StateChange::ReceiveProcessed { sender: C, message_identifier: transfer.message_identifier },
    );
    assert_eq!(a.pending_messages.len(), 1);

    state_transition(
        &mut a,
        &StateChange::ReceiveProcessed { sender: B, message_identifier: transfer.message_identifier },
    );
    assert!(a.pending_messages.is_empty());
}

#[test]
fn test_transition_is_deterministic() {
    let changes = vec![
        StateChange::ActionNewChannel { channel: channel([0xc1; 20], A, B, 100) },
        StateChange::Block { block_number: 12 },
        StateChange::ActionInitInitiator {
            token_network_identifier: NET,
            payment_identifier: 1,
            amount: U256::from(3),
            target: B,
            secret: [6; 32],
            expiration: U256::from(99),
            routes: vec![RouteState { node_address: B, channel_identifier: [0xc1; 20] }],
        },
    ];
    let run = || {
        let machine = TransferStateMachine::new(A, chain_id());
        let mut state = None;
        let mut all_events = Vec::new();
        for change in &changes {
            let out = machine.transition(state.take(), change);
            state = Some(out.new_state);
            all_events.extend(out.events);
        }
        (state, all_events)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_wal_replay_rebuilds_channel_state() {
    use std::sync::Arc;
    use xc_03_storage::{InMemoryKVStore, Storage};
    use xc_04_wal::WriteAheadLog;

    let storage = Arc::new(Storage::open(InMemoryKVStore::new()).unwrap());
    let ch = [0xc1; 20];
    let (mut wal, _) =
        WriteAheadLog::restore(TransferStateMachine::new(B, chain_id()), Arc::clone(&storage)).unwrap();
    wal.log_and_dispatch(&StateChange::ActionNewChannel { channel: channel(ch, B, A, 100) }, 1)
        .unwrap();
    wal.snapshot().unwrap();
    let mut a = node(A, &[(ch, B)]);
    let transfer = take_locked(&start_payment(&mut a, B, [1; 32], 10));
    let events = wal
        .log_and_dispatch(&StateChange::ActionInitTarget { sender: A, transfer }, 2)
        .unwrap();
    assert_eq!(events.len(), 2);

    let live = wal.current_state().cloned();
    drop(wal);
    let (restored, replayed) =
        WriteAheadLog::restore(TransferStateMachine::new(B, chain_id()), storage).unwrap();
    assert_eq!(restored.current_state().cloned(), live);
    assert_eq!(replayed, events);
}
