//! # Dispatcher
//!
//! Closed dispatch over [`Message`]. Channel kinds become state changes;
//! swap kinds update the swap row (see [`crate::swap`]).

use shared_types::{address_hex, random_secret, Address};
use tracing::{debug, warn};
use xc_01_wire_codec::{
    decode, DirectTransfer, LockedTransfer, Message, Processed, RevealSecret,
    SecretRequest, Unlock,
};
use xc_03_storage::{KeyValueStore, StateSerializer};
use xc_05_transfer::domain::{balanceproof_from_direct, balanceproof_from_unlock};
use xc_05_transfer::{
    get_best_routes, get_transfer_role, Event, LockedTransferState, StateChange, TransferRole,
};
use xc_telemetry::{HistogramTimer, DISPATCH_DURATION, MESSAGES_DROPPED, MESSAGES_RECEIVED};

use crate::adapters::recover_sender;
use crate::context::NodeContext;
use crate::domain::DispatchError;
use crate::swap;

/// Decode raw bytes and dispatch them. Undecodable input is dropped.
pub async fn receive<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    data: &[u8],
) -> bool {
    match decode(data) {
        Ok(message) => on_message(ctx, message).await,
        Err(e) => {
            MESSAGES_DROPPED
                .with_label_values(&["undecodable", "decode"])
                .inc();
            warn!(error = %e, bytes = data.len(), "Dropping undecodable message");
            false
        }
    }
}

/// Handle one decoded message.
///
/// Returns `true` when the message was handled and the transport may
/// acknowledge it with `Delivered`.
pub async fn on_message<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    message: Message,
) -> bool {
    let kind = message.kind();
    MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    let _timer = HistogramTimer::new(&DISPATCH_DURATION);

    match dispatch(ctx, message).await {
        Ok(()) => {
            debug!(kind, "Message handled");
            true
        }
        Err(DispatchError::UnknownMessageKind(kind)) => {
            MESSAGES_DROPPED.with_label_values(&[kind, "unhandled"]).inc();
            debug!(kind, "No inbound handler for message kind");
            false
        }
        Err(e) => {
            MESSAGES_DROPPED.with_label_values(&[kind, e.reason()]).inc();
            warn!(kind, error = %e, "Dropping message");
            false
        }
    }
}

async fn dispatch<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    message: Message,
) -> Result<(), DispatchError> {
    let kind = message.kind();
    match message {
        Message::Ping(_) | Message::Pong(_) | Message::Delivered(_) => {
            Err(DispatchError::UnknownMessageKind(kind))
        }
        Message::CrossTransaction(m) => swap::handle_crosstransaction(ctx, m).await,
        Message::AcceptCross(m) => swap::handle_acceptcross(ctx, m).await,
        Message::CrossLockedTransfer(m) => swap::handle_crosslockedtransfer(ctx, m).await,
        Message::CrossSecretRequest(m) => swap::handle_crosssecretrequest(ctx, m).await,
        channel => {
            let sender = recover_sender(&channel)?;
            handle_channel_message(ctx, sender, channel).await
        }
    }
}

async fn handle_channel_message<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: Message,
) -> Result<(), DispatchError> {
    match message {
        Message::SecretRequest(m) => handle_message_secretrequest(ctx, sender, m).await,
        Message::RevealSecret(m) => handle_message_revealsecret(ctx, sender, m).await,
        Message::Secret(m) => handle_message_secret(ctx, sender, m).await,
        Message::DirectTransfer(m) => handle_message_directtransfer(ctx, sender, m).await,
        Message::RefundTransfer(m) => handle_message_refundtransfer(ctx, sender, m).await,
        Message::LockedTransfer(m) => handle_message_lockedtransfer(ctx, sender, m)
            .await
            .map(|_| ()),
        Message::Processed(m) => handle_message_processed(ctx, sender, m).await,
        other => Err(DispatchError::UnknownMessageKind(other.kind())),
    }
}

// =============================================================================
// CHANNEL HANDLERS
// =============================================================================

/// Secret request change for `request` as sent by `sender`.
pub(crate) fn secret_request_change(sender: Address, request: &SecretRequest) -> StateChange {
    StateChange::ReceiveSecretRequest {
        payment_identifier: request.payment_identifier,
        amount: request.amount,
        secrethash: request.secrethash,
        sender,
    }
}

async fn handle_message_secretrequest<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: SecretRequest,
) -> Result<(), DispatchError> {
    ctx.handle_state_change(secret_request_change(sender, &message))
        .await?;
    Ok(())
}

async fn handle_message_revealsecret<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: RevealSecret,
) -> Result<(), DispatchError> {
    let change = StateChange::ReceiveSecretReveal {
        secret: message.secret,
        sender,
    };
    ctx.handle_state_change(change).await?;
    Ok(())
}

async fn handle_message_secret<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: Unlock,
) -> Result<(), DispatchError> {
    let change = StateChange::ReceiveUnlock {
        message_identifier: message.message_identifier,
        secret: message.secret,
        sender,
        balance_proof: balanceproof_from_unlock(&message),
    };
    ctx.handle_state_change(change).await?;
    Ok(())
}

async fn handle_message_directtransfer<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: DirectTransfer,
) -> Result<(), DispatchError> {
    let change = StateChange::ReceiveTransferDirect {
        token_network_identifier: message.token_network_address,
        message_identifier: message.message_identifier,
        payment_identifier: message.payment_identifier,
        sender,
        balance_proof: balanceproof_from_direct(&message),
    };
    ctx.handle_state_change(change).await?;
    Ok(())
}

/// A refund is a cancelled route when this node started the payment;
/// the retry runs under a fresh secret.
async fn handle_message_refundtransfer<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: LockedTransfer,
) -> Result<(), DispatchError> {
    let transfer = LockedTransferState::from_message(&message);
    let our_address = ctx.address();
    let (routes, role) = ctx.with_chain_state(|state| {
        let routes = get_best_routes(
            state,
            &message.token_network_address,
            &our_address,
            &message.target,
            message.lock.amount,
            Some(&sender),
        );
        (routes, get_transfer_role(state, &message.lock.secrethash))
    });

    let change = if role == Some(TransferRole::Initiator) {
        StateChange::ReceiveTransferRefundCancelRoute {
            sender,
            routes,
            transfer,
            secret: random_secret(),
        }
    } else {
        StateChange::ReceiveTransferRefund {
            sender,
            transfer,
            routes,
        }
    };
    ctx.handle_state_change(change).await?;
    Ok(())
}

/// Target when the transfer names this node, mediator otherwise.
pub(crate) async fn handle_message_lockedtransfer<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: LockedTransfer,
) -> Result<Vec<Event>, DispatchError> {
    let transfer = LockedTransferState::from_message(&message);
    let our_address = ctx.address();
    let change = if message.target == our_address {
        StateChange::ActionInitTarget { sender, transfer }
    } else {
        let routes = ctx.with_chain_state(|state| {
            get_best_routes(
                state,
                &message.token_network_address,
                &our_address,
                &message.target,
                message.lock.amount,
                Some(&sender),
            )
        });
        debug!(
            target = %address_hex(&message.target),
            routes = routes.len(),
            "Mediating locked transfer"
        );
        StateChange::ActionInitMediator {
            sender,
            routes,
            transfer,
        }
    };
    ctx.handle_state_change(change).await
}

async fn handle_message_processed<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    sender: Address,
    message: Processed,
) -> Result<(), DispatchError> {
    let change = StateChange::ReceiveProcessed {
        sender,
        message_identifier: message.message_identifier,
    };
    ctx.handle_state_change(change).await?;
    Ok(())
}
