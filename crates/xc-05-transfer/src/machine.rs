//! # Transition Function
//!
//! `state_transition` is pure: it reads nothing but the state and the change,
//! which is what lets the write-ahead log rebuild state by replay.

use shared_types::{keccak256, Address, Secret, SecretHash, U256};
use tracing::{debug, warn};
use xc_01_wire_codec::Lock;
use xc_04_wal::{StateMachine, Transition};

use crate::domain::{
    compute_locksroot, BalanceProof, ChainState, ChannelState, Event, LockedTransferState,
    PaymentStatus, PaymentTask, PendingMessage, RouteState, StateChange, TransferRole,
};

/// The node's state machine, pluggable into the write-ahead log.
#[derive(Debug, Clone)]
pub struct TransferStateMachine {
    our_address: Address,
    chain_id: U256,
}

impl TransferStateMachine {
    pub fn new(our_address: Address, chain_id: U256) -> Self {
        Self {
            our_address,
            chain_id,
        }
    }

    /// State the machine starts from when nothing has been applied yet.
    pub fn initial_state(&self) -> ChainState {
        ChainState::new(self.our_address, self.chain_id, 0)
    }
}

impl StateMachine for TransferStateMachine {
    type State = ChainState;
    type Change = StateChange;
    type Event = Event;

    fn transition(&self, state: Option<ChainState>, change: &StateChange) -> Transition<ChainState, Event> {
        let mut state = state.unwrap_or_else(|| self.initial_state());
        let events = state_transition(&mut state, change);
        Transition::new(state, events)
    }
}

/// Apply one state change in place.
pub fn state_transition(state: &mut ChainState, change: &StateChange) -> Vec<Event> {
    debug!(kind = change.kind(), "Applying state change");
    match change {
        StateChange::Block { block_number } => {
            state.block_number = state.block_number.max(*block_number);
            Vec::new()
        }
        StateChange::ActionNewChannel { channel } => {
            if state.channel(&channel.identifier).is_none() {
                state.channels.push(channel.clone());
            }
            Vec::new()
        }
        StateChange::ActionInitInitiator {
            token_network_identifier,
            payment_identifier,
            amount,
            target,
            secret,
            expiration,
            routes,
        } => handle_init_initiator(
            state,
            token_network_identifier,
            *payment_identifier,
            *amount,
            *target,
            *secret,
            *expiration,
            routes,
        ),
        StateChange::ActionInitTarget { sender, transfer } => {
            handle_init_target(state, *sender, transfer)
        }
        StateChange::ActionInitMediator {
            sender,
            routes,
            transfer,
        } => handle_init_mediator(state, *sender, routes, transfer),
        StateChange::ReceiveSecretRequest {
            payment_identifier,
            amount,
            secrethash,
            sender,
        } => handle_secret_request(state, *payment_identifier, *amount, secrethash, *sender),
        StateChange::ReceiveSecretReveal { secret, sender } => {
            handle_secret_reveal(state, secret, *sender)
        }
        StateChange::ReceiveUnlock {
            message_identifier,
            secret,
            sender,
            balance_proof,
        } => handle_unlock(state, *message_identifier, secret, *sender, balance_proof),
        StateChange::ReceiveTransferDirect {
            token_network_identifier,
            message_identifier,
            payment_identifier,
            sender,
            balance_proof,
        } => handle_direct_transfer(
            state,
            token_network_identifier,
            *message_identifier,
            *payment_identifier,
            *sender,
            balance_proof,
        ),
        StateChange::ReceiveTransferRefund {
            sender,
            transfer,
            routes,
        } => handle_refund(state, *sender, transfer, routes),
        StateChange::ReceiveTransferRefundCancelRoute {
            sender,
            routes,
            transfer,
            secret,
        } => handle_refund_cancel_route(state, *sender, routes, transfer, secret),
        StateChange::ReceiveProcessed {
            sender,
            message_identifier,
        } => {
            state.pending_messages.retain(|pending| {
                !(pending.recipient == *sender && pending.message_identifier == *message_identifier)
            });
            Vec::new()
        }
    }
}

// =============================================================================
// OUTBOUND LOCKS
// =============================================================================

/// Offer `lock` to the partner of `channel_identifier`.
///
/// Returns `None` if the channel is unknown, closed or lacks capacity.
fn send_lockedtransfer(
    state: &mut ChainState,
    channel_identifier: &Address,
    payment_identifier: u64,
    lock: Lock,
    initiator: Address,
    target: Address,
) -> Option<LockedTransferState> {
    let capacity_ok = state
        .channel(channel_identifier)
        .is_some_and(|channel| channel.is_open() && channel.our_distributable() >= lock.amount);
    if !capacity_ok {
        return None;
    }
    let message_identifier = state.next_message_identifier();
    let chain_id = state.chain_id;
    let channel = state.channel_mut(channel_identifier)?;

    channel.our_state.pending_locks.push(lock.clone());
    let balance_proof = BalanceProof {
        nonce: channel.our_state.nonce() + 1,
        transferred_amount: channel.our_state.transferred_amount(),
        locked_amount: channel.our_state.locked_amount(),
        locksroot: channel.our_state.locksroot(),
        channel_identifier: channel.identifier,
        token_network_identifier: channel.token_network_identifier,
        chain_id,
    };
    channel.our_state.balance_proof = Some(balance_proof.clone());
    let recipient = channel.partner();
    let token = channel.token;

    state.pending_messages.push(PendingMessage {
        recipient,
        message_identifier,
    });
    Some(LockedTransferState {
        message_identifier,
        payment_identifier,
        token,
        recipient,
        balance_proof,
        lock,
        initiator,
        target,
        fee: U256::zero(),
    })
}

/// Try each route in order, skipping `excluded` hops.
fn forward_on_first_route(
    state: &mut ChainState,
    routes: &[RouteState],
    excluded: &[Address],
    payment_identifier: u64,
    lock: &Lock,
    initiator: Address,
    target: Address,
) -> Option<(RouteState, LockedTransferState, Vec<RouteState>)> {
    for (index, route) in routes.iter().enumerate() {
        if excluded.contains(&route.node_address) {
            continue;
        }
        if let Some(transfer) = send_lockedtransfer(
            state,
            &route.channel_identifier,
            payment_identifier,
            lock.clone(),
            initiator,
            target,
        ) {
            let remaining = routes[index + 1..].to_vec();
            return Some((route.clone(), transfer, remaining));
        }
    }
    None
}

/// Settle our pending lock under `secrethash` off-chain.
fn send_unlock(
    state: &mut ChainState,
    channel_identifier: &Address,
    secrethash: &SecretHash,
    payment_identifier: u64,
    secret: Secret,
) -> Option<Event> {
    let has_lock = state
        .channel(channel_identifier)
        .is_some_and(|channel| channel.our_state.lock_by_secrethash(secrethash).is_some());
    if !has_lock {
        return None;
    }
    let message_identifier = state.next_message_identifier();
    let chain_id = state.chain_id;
    let channel = state.channel_mut(channel_identifier)?;

    let index = channel
        .our_state
        .pending_locks
        .iter()
        .position(|lock| &lock.secrethash == secrethash)?;
    let lock = channel.our_state.pending_locks.remove(index);
    let balance_proof = BalanceProof {
        nonce: channel.our_state.nonce() + 1,
        transferred_amount: channel.our_state.transferred_amount().saturating_add(lock.amount),
        locked_amount: channel.our_state.locked_amount(),
        locksroot: channel.our_state.locksroot(),
        channel_identifier: channel.identifier,
        token_network_identifier: channel.token_network_identifier,
        chain_id,
    };
    channel.our_state.balance_proof = Some(balance_proof.clone());
    let recipient = channel.partner();

    state.pending_messages.push(PendingMessage {
        recipient,
        message_identifier,
    });
    Some(Event::SendUnlock {
        recipient,
        message_identifier,
        payment_identifier,
        secret,
        balance_proof,
    })
}

fn send_reveal(state: &mut ChainState, recipient: Address, secret: Secret) -> Event {
    let message_identifier = state.next_message_identifier();
    state.pending_messages.push(PendingMessage {
        recipient,
        message_identifier,
    });
    Event::SendRevealSecret {
        recipient,
        message_identifier,
        secret,
    }
}

// =============================================================================
// INBOUND VALIDATION
// =============================================================================

fn check_partner(channel: &ChannelState, sender: Address, proof: &BalanceProof) -> Result<(), String> {
    if !channel.is_open() {
        return Err("channel is closed".into());
    }
    if channel.partner() != sender {
        return Err("sender is not the channel partner".into());
    }
    if proof.chain_id != channel.chain_id {
        return Err("chain id mismatch".into());
    }
    if proof.token_network_identifier != channel.token_network_identifier {
        return Err("token network mismatch".into());
    }
    let expected_nonce = channel.partner_state.nonce() + 1;
    if proof.nonce != expected_nonce {
        return Err(format!(
            "invalid nonce: expected {}, got {}",
            expected_nonce, proof.nonce
        ));
    }
    Ok(())
}

fn validate_locked_transfer(
    state: &ChainState,
    sender: Address,
    transfer: &LockedTransferState,
) -> Result<(), String> {
    let channel = state
        .channel(&transfer.balance_proof.channel_identifier)
        .ok_or_else(|| "unknown channel".to_string())?;
    let proof = &transfer.balance_proof;
    let lock = &transfer.lock;
    check_partner(channel, sender, proof)?;

    let partner = &channel.partner_state;
    if partner.lock_by_secrethash(&lock.secrethash).is_some() {
        return Err("lock already pending".into());
    }
    if proof.transferred_amount != partner.transferred_amount() {
        return Err("transferred amount changed on a locked transfer".into());
    }
    if proof.locked_amount != partner.locked_amount().saturating_add(lock.amount) {
        return Err("locked amount does not include the new lock".into());
    }
    let mut locks = partner.pending_locks.clone();
    locks.push(lock.clone());
    if proof.locksroot != compute_locksroot(&locks) {
        return Err("locksroot mismatch".into());
    }
    if lock.amount > channel.partner_distributable() {
        return Err("lock amount exceeds distributable balance".into());
    }
    if lock.expiration <= U256::from(state.block_number) {
        return Err("lock already expired".into());
    }
    Ok(())
}

fn apply_locked_transfer(state: &mut ChainState, transfer: &LockedTransferState) {
    if let Some(channel) = state.channel_mut(&transfer.balance_proof.channel_identifier) {
        channel
            .partner_state
            .pending_locks
            .push(transfer.lock.clone());
        channel.partner_state.balance_proof = Some(transfer.balance_proof.clone());
    }
}

fn invalid_locked(transfer: &LockedTransferState, reason: String) -> Vec<Event> {
    warn!(payment_identifier = transfer.payment_identifier, %reason, "Invalid locked transfer");
    vec![Event::EventInvalidReceivedLockedTransfer {
        payment_identifier: transfer.payment_identifier,
        reason,
    }]
}

fn processed(recipient: Address, message_identifier: u64) -> Event {
    Event::SendProcessed {
        recipient,
        message_identifier,
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[allow(clippy::too_many_arguments)]
fn handle_init_initiator(
    state: &mut ChainState,
    token_network: &Address,
    payment_identifier: u64,
    amount: U256,
    target: Address,
    secret: Secret,
    expiration: U256,
    routes: &[RouteState],
) -> Vec<Event> {
    let secrethash = keccak256(&secret);
    if state.payment(&secrethash).is_some() {
        return vec![Event::EventPaymentSentFailed {
            payment_identifier,
            reason: "secret already used".into(),
        }];
    }
    let lock = Lock {
        amount,
        expiration,
        secrethash,
    };
    let our_address = state.our_address;
    let routes: Vec<RouteState> = routes
        .iter()
        .filter(|route| {
            state
                .channel(&route.channel_identifier)
                .is_some_and(|c| &c.token_network_identifier == token_network)
        })
        .cloned()
        .collect();

    match forward_on_first_route(state, &routes, &[], payment_identifier, &lock, our_address, target) {
        Some((route, transfer, remaining)) => {
            state.payments.push(PaymentTask {
                role: TransferRole::Initiator,
                secrethash,
                payment_identifier,
                amount,
                initiator: our_address,
                target,
                secret: Some(secret),
                status: PaymentStatus::Pending,
                payer_channel: None,
                payee_channel: Some(route.channel_identifier),
                routes: remaining,
            });
            vec![Event::SendLockedTransfer {
                recipient: route.node_address,
                transfer,
            }]
        }
        None => vec![Event::EventPaymentSentFailed {
            payment_identifier,
            reason: "no route available".into(),
        }],
    }
}

fn handle_init_target(state: &mut ChainState, sender: Address, transfer: &LockedTransferState) -> Vec<Event> {
    if let Err(reason) = validate_locked_transfer(state, sender, transfer) {
        return invalid_locked(transfer, reason);
    }
    apply_locked_transfer(state, transfer);

    let secrethash = transfer.lock.secrethash;
    state.payments.push(PaymentTask {
        role: TransferRole::Target,
        secrethash,
        payment_identifier: transfer.payment_identifier,
        amount: transfer.lock.amount,
        initiator: transfer.initiator,
        target: transfer.target,
        secret: None,
        status: PaymentStatus::Pending,
        payer_channel: Some(transfer.balance_proof.channel_identifier),
        payee_channel: None,
        routes: Vec::new(),
    });

    let message_identifier = state.next_message_identifier();
    state.pending_messages.push(PendingMessage {
        recipient: transfer.initiator,
        message_identifier,
    });
    vec![
        processed(sender, transfer.message_identifier),
        Event::SendSecretRequest {
            recipient: transfer.initiator,
            message_identifier,
            payment_identifier: transfer.payment_identifier,
            amount: transfer.lock.amount,
            secrethash,
        },
    ]
}

fn handle_init_mediator(
    state: &mut ChainState,
    sender: Address,
    routes: &[RouteState],
    transfer: &LockedTransferState,
) -> Vec<Event> {
    if let Err(reason) = validate_locked_transfer(state, sender, transfer) {
        return invalid_locked(transfer, reason);
    }
    apply_locked_transfer(state, transfer);

    let payer_channel = transfer.balance_proof.channel_identifier;
    let mut events = vec![processed(sender, transfer.message_identifier)];
    let mut task = PaymentTask {
        role: TransferRole::Mediator,
        secrethash: transfer.lock.secrethash,
        payment_identifier: transfer.payment_identifier,
        amount: transfer.lock.amount,
        initiator: transfer.initiator,
        target: transfer.target,
        secret: None,
        status: PaymentStatus::Pending,
        payer_channel: Some(payer_channel),
        payee_channel: None,
        routes: Vec::new(),
    };

    match forward_on_first_route(
        state,
        routes,
        &[sender],
        transfer.payment_identifier,
        &transfer.lock,
        transfer.initiator,
        transfer.target,
    ) {
        Some((route, forwarded, remaining)) => {
            task.payee_channel = Some(route.channel_identifier);
            task.routes = remaining;
            events.push(Event::SendLockedTransfer {
                recipient: route.node_address,
                transfer: forwarded,
            });
        }
        None => {
            if let Some(refund) = send_lockedtransfer(
                state,
                &payer_channel,
                transfer.payment_identifier,
                transfer.lock.clone(),
                transfer.initiator,
                transfer.target,
            ) {
                task.status = PaymentStatus::Refunded;
                events.push(Event::SendRefundTransfer {
                    recipient: sender,
                    transfer: refund,
                });
            }
        }
    }
    state.payments.push(task);
    events
}

fn handle_secret_request(
    state: &mut ChainState,
    payment_identifier: u64,
    amount: U256,
    secrethash: &SecretHash,
    sender: Address,
) -> Vec<Event> {
    let invalid = |reason: &str| {
        vec![Event::EventInvalidSecretRequest {
            payment_identifier,
            reason: reason.to_string(),
        }]
    };
    let Some(task) = state.payment(secrethash) else {
        return invalid("unknown secrethash");
    };
    if task.role != TransferRole::Initiator {
        return invalid("not the initiator of this payment");
    }
    if task.target != sender {
        return invalid("secret request not sent by the target");
    }
    if task.payment_identifier != payment_identifier || task.amount != amount {
        return invalid("payment identifier or amount mismatch");
    }
    if task.status != PaymentStatus::Pending {
        return Vec::new();
    }
    let Some(secret) = task.secret else {
        return invalid("secret unknown");
    };

    if let Some(task) = state.payment_mut(secrethash) {
        task.status = PaymentStatus::SecretRevealed;
    }
    vec![send_reveal(state, sender, secret)]
}

fn handle_secret_reveal(state: &mut ChainState, secret: &Secret, sender: Address) -> Vec<Event> {
    let secrethash = keccak256(secret);
    let Some(task) = state.payment(&secrethash).cloned() else {
        return Vec::new();
    };
    let partner_of = |state: &ChainState, channel: Option<Address>| {
        channel
            .and_then(|id| state.channel(&id))
            .map(|channel| channel.partner())
    };
    let payer = partner_of(state, task.payer_channel);
    let payee = partner_of(state, task.payee_channel);

    let mut events = Vec::new();
    match task.role {
        TransferRole::Target => {
            if task.status != PaymentStatus::Pending {
                return events;
            }
            if let Some(payer) = payer {
                events.push(send_reveal(state, payer, *secret));
            }
        }
        TransferRole::Mediator => {
            if task.secret.is_some() || Some(sender) != payee {
                if let Some(t) = state.payment_mut(&secrethash) {
                    t.secret = Some(*secret);
                }
                return events;
            }
            if let Some(channel) = task.payee_channel {
                events.extend(send_unlock(state, &channel, &secrethash, task.payment_identifier, *secret));
            }
            if let Some(payer) = payer {
                events.push(send_reveal(state, payer, *secret));
            }
        }
        TransferRole::Initiator => {
            if task.status == PaymentStatus::Unlocked || Some(sender) != payee {
                return events;
            }
            if let Some(channel) = task.payee_channel {
                events.extend(send_unlock(state, &channel, &secrethash, task.payment_identifier, *secret));
            }
            events.push(Event::EventPaymentSentSuccess {
                payment_identifier: task.payment_identifier,
                amount: task.amount,
                target: task.target,
            });
            events.push(Event::EventUnlockSuccess {
                payment_identifier: task.payment_identifier,
                secrethash,
            });
        }
    }

    if let Some(t) = state.payment_mut(&secrethash) {
        t.secret = Some(*secret);
        t.status = if t.role == TransferRole::Initiator {
            PaymentStatus::Unlocked
        } else {
            PaymentStatus::SecretRevealed
        };
    }
    events
}

fn handle_unlock(
    state: &mut ChainState,
    message_identifier: u64,
    secret: &Secret,
    sender: Address,
    proof: &BalanceProof,
) -> Vec<Event> {
    let secrethash = keccak256(secret);
    let invalid = |reason: String| {
        warn!(%reason, "Invalid unlock");
        vec![Event::EventInvalidReceivedUnlock { reason }]
    };
    let Some(channel) = state.channel(&proof.channel_identifier) else {
        return invalid("unknown channel".into());
    };
    if let Err(reason) = check_partner(channel, sender, proof) {
        return invalid(reason);
    }
    let partner = &channel.partner_state;
    let Some(index) = partner
        .pending_locks
        .iter()
        .position(|lock| lock.secrethash == secrethash)
    else {
        return invalid("no pending lock for this secret".into());
    };
    let amount = partner.pending_locks[index].amount;
    let mut remaining = partner.pending_locks.clone();
    remaining.remove(index);
    let remaining_locked = remaining
        .iter()
        .fold(U256::zero(), |acc, lock| acc.saturating_add(lock.amount));

    if proof.transferred_amount != partner.transferred_amount().saturating_add(amount) {
        return invalid("transferred amount does not include the unlocked lock".into());
    }
    if proof.locked_amount != remaining_locked {
        return invalid("locked amount still includes the unlocked lock".into());
    }
    if proof.locksroot != compute_locksroot(&remaining) {
        return invalid("locksroot mismatch".into());
    }

    if let Some(channel) = state.channel_mut(&proof.channel_identifier) {
        channel.partner_state.pending_locks = remaining;
        channel.partner_state.balance_proof = Some(proof.clone());
    }

    let mut events = vec![processed(sender, message_identifier)];
    if let Some(task) = state.payment_mut(&secrethash) {
        task.secret = Some(*secret);
        task.status = PaymentStatus::Unlocked;
        events.push(Event::EventUnlockSuccess {
            payment_identifier: task.payment_identifier,
            secrethash,
        });
        if task.role == TransferRole::Target {
            events.push(Event::EventPaymentReceivedSuccess {
                payment_identifier: task.payment_identifier,
                amount,
                initiator: task.initiator,
            });
        }
    }
    events
}

fn handle_direct_transfer(
    state: &mut ChainState,
    token_network: &Address,
    message_identifier: u64,
    payment_identifier: u64,
    sender: Address,
    proof: &BalanceProof,
) -> Vec<Event> {
    let invalid = |reason: String| {
        warn!(payment_identifier, %reason, "Invalid direct transfer");
        vec![Event::EventTransferReceivedInvalidDirectTransfer {
            payment_identifier,
            reason,
        }]
    };
    let Some(channel) = state.channel(&proof.channel_identifier) else {
        return invalid("unknown channel".into());
    };
    if &channel.token_network_identifier != token_network {
        return invalid("token network mismatch".into());
    }
    if let Err(reason) = check_partner(channel, sender, proof) {
        return invalid(reason);
    }
    let partner = &channel.partner_state;
    if proof.locked_amount != partner.locked_amount() || proof.locksroot != partner.locksroot() {
        return invalid("direct transfer changed the pending locks".into());
    }
    let previous = partner.transferred_amount();
    if proof.transferred_amount <= previous {
        return invalid("transferred amount did not increase".into());
    }
    let amount = proof.transferred_amount - previous;
    if amount > channel.partner_distributable() {
        return invalid("amount exceeds distributable balance".into());
    }

    if let Some(channel) = state.channel_mut(&proof.channel_identifier) {
        channel.partner_state.balance_proof = Some(proof.clone());
    }
    vec![
        processed(sender, message_identifier),
        Event::EventPaymentReceivedSuccess {
            payment_identifier,
            amount,
            initiator: sender,
        },
    ]
}

fn handle_refund(
    state: &mut ChainState,
    sender: Address,
    transfer: &LockedTransferState,
    routes: &[RouteState],
) -> Vec<Event> {
    let secrethash = transfer.lock.secrethash;
    let Some(task) = state.payment(&secrethash).cloned() else {
        return invalid_locked(transfer, "refund for an unknown payment".into());
    };
    if task.role != TransferRole::Mediator
        || task.payee_channel != Some(transfer.balance_proof.channel_identifier)
    {
        return invalid_locked(transfer, "refund not received from the payee".into());
    }
    if let Err(reason) = validate_refund(state, sender, transfer) {
        return invalid_locked(transfer, reason);
    }
    apply_locked_transfer(state, transfer);

    let mut events = vec![processed(sender, transfer.message_identifier)];
    let payer = task
        .payer_channel
        .and_then(|id| state.channel(&id))
        .map(|channel| channel.partner());
    let excluded: Vec<Address> = std::iter::once(sender).chain(payer).collect();
    let candidates: Vec<RouteState> = routes.iter().chain(task.routes.iter()).cloned().collect();

    match forward_on_first_route(
        state,
        &candidates,
        &excluded,
        task.payment_identifier,
        &transfer.lock,
        task.initiator,
        task.target,
    ) {
        Some((route, forwarded, remaining)) => {
            if let Some(t) = state.payment_mut(&secrethash) {
                t.payee_channel = Some(route.channel_identifier);
                t.routes = remaining;
            }
            events.push(Event::SendLockedTransfer {
                recipient: route.node_address,
                transfer: forwarded,
            });
        }
        None => {
            let refund = task.payer_channel.zip(payer).and_then(|(channel, payer)| {
                send_lockedtransfer(
                    state,
                    &channel,
                    task.payment_identifier,
                    transfer.lock.clone(),
                    task.initiator,
                    task.target,
                )
                .map(|refund| (payer, refund))
            });
            if let Some((payer, refund)) = refund {
                events.push(Event::SendRefundTransfer {
                    recipient: payer,
                    transfer: refund,
                });
            }
            if let Some(t) = state.payment_mut(&secrethash) {
                t.status = PaymentStatus::Refunded;
            }
        }
    }
    events
}

fn handle_refund_cancel_route(
    state: &mut ChainState,
    sender: Address,
    routes: &[RouteState],
    transfer: &LockedTransferState,
    secret: &Secret,
) -> Vec<Event> {
    let old_hash = transfer.lock.secrethash;
    let Some(task) = state.payment(&old_hash).cloned() else {
        return invalid_locked(transfer, "refund for an unknown payment".into());
    };
    if task.role != TransferRole::Initiator
        || task.payee_channel != Some(transfer.balance_proof.channel_identifier)
    {
        return invalid_locked(transfer, "refund not received from the payee".into());
    }
    if let Err(reason) = validate_refund(state, sender, transfer) {
        return invalid_locked(transfer, reason);
    }
    apply_locked_transfer(state, transfer);
    if let Some(t) = state.payment_mut(&old_hash) {
        t.status = PaymentStatus::Cancelled;
    }

    let mut events = vec![processed(sender, transfer.message_identifier)];
    let secrethash = keccak256(secret);
    let lock = Lock {
        amount: task.amount,
        expiration: transfer.lock.expiration,
        secrethash,
    };
    let our_address = state.our_address;
    let candidates: Vec<RouteState> = routes.iter().chain(task.routes.iter()).cloned().collect();

    match forward_on_first_route(
        state,
        &candidates,
        &[sender],
        task.payment_identifier,
        &lock,
        our_address,
        task.target,
    ) {
        Some((route, forwarded, remaining)) => {
            state.payments.push(PaymentTask {
                role: TransferRole::Initiator,
                secrethash,
                payment_identifier: task.payment_identifier,
                amount: task.amount,
                initiator: our_address,
                target: task.target,
                secret: Some(*secret),
                status: PaymentStatus::Pending,
                payer_channel: None,
                payee_channel: Some(route.channel_identifier),
                routes: remaining,
            });
            events.push(Event::SendLockedTransfer {
                recipient: route.node_address,
                transfer: forwarded,
            });
        }
        None => events.push(Event::EventPaymentSentFailed {
            payment_identifier: task.payment_identifier,
            reason: "no route left after refund".into(),
        }),
    }
    events
}

/// A refund is a locked transfer whose lock we offered on the same channel.
fn validate_refund(state: &ChainState, sender: Address, transfer: &LockedTransferState) -> Result<(), String> {
    let channel = state
        .channel(&transfer.balance_proof.channel_identifier)
        .ok_or_else(|| "unknown channel".to_string())?;
    if channel
        .our_state
        .lock_by_secrethash(&transfer.lock.secrethash)
        .map(|lock| lock.amount)
        != Some(transfer.lock.amount)
    {
        return Err("refund does not mirror our lock".into());
    }
    validate_locked_transfer(state, sender, transfer)
}

#[cfg(test)]
mod tests;
