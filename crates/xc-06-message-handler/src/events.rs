//! # Event Emission
//!
//! Turns `Send*` events into signed wire messages. Events are only emitted
//! after the state change that produced them has been logged; a failed
//! send is logged and left for the pending-message resend after restart.

use shared_types::{address_hex, Address, Signature, SecretHash, U256};
use tracing::{info, warn};
use xc_01_wire_codec::{
    CrossLockedTransfer, CrossSecretRequest, LockedTransfer, Message, Processed, RevealSecret,
    SecretRequest, Unlock,
};
use xc_03_storage::{KeyValueStore, StateSerializer, StorageError};
use xc_05_transfer::{Event, LockedTransferState};

use crate::context::NodeContext;
use crate::domain::DispatchError;

/// Emit every event in order, logging failures.
pub async fn emit_events<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    events: &[Event],
) {
    for event in events {
        if let Err(e) = emit_event(ctx, event).await {
            warn!(error = %e, "Failed to emit event");
        }
    }
}

/// Emit one event: send a message for `Send*`, log everything else.
pub async fn emit_event<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    event: &Event,
) -> Result<(), DispatchError> {
    match event {
        Event::SendLockedTransfer {
            recipient,
            transfer,
        } => {
            let message = locked_transfer_message(transfer);
            match ctx.take_cross_payment(&transfer.lock.secrethash) {
                Some(payment) => {
                    send_cross_locked_transfer(
                        ctx,
                        *recipient,
                        message,
                        payment.identifier,
                        payment.payment_string,
                    )
                    .await
                }
                None => {
                    ctx.sign_and_send(*recipient, Message::LockedTransfer(message))
                        .await
                }
            }
        }
        Event::SendRefundTransfer {
            recipient,
            transfer,
        } => {
            let message = locked_transfer_message(transfer);
            ctx.sign_and_send(*recipient, Message::RefundTransfer(message))
                .await
        }
        Event::SendSecretRequest {
            recipient,
            message_identifier,
            payment_identifier,
            amount,
            secrethash,
        } => {
            let request = SecretRequest {
                message_identifier: *message_identifier,
                payment_identifier: *payment_identifier,
                secrethash: *secrethash,
                amount: *amount,
                signature: Signature::EMPTY,
            };
            match swap_for_secrethash(ctx, secrethash)? {
                Some(cross_id) => send_cross_secret_request(ctx, *recipient, request, cross_id).await,
                None => {
                    ctx.sign_and_send(*recipient, Message::SecretRequest(request))
                        .await
                }
            }
        }
        Event::SendRevealSecret {
            recipient,
            message_identifier,
            secret,
        } => {
            let message = Message::RevealSecret(RevealSecret {
                message_identifier: *message_identifier,
                secret: *secret,
                signature: Signature::EMPTY,
            });
            ctx.sign_and_send(*recipient, message).await
        }
        Event::SendUnlock {
            recipient,
            message_identifier,
            payment_identifier,
            secret,
            balance_proof,
        } => {
            let message = Message::Secret(Unlock {
                chain_id: balance_proof.chain_id,
                message_identifier: *message_identifier,
                payment_identifier: *payment_identifier,
                token_network_address: balance_proof.token_network_identifier,
                secret: *secret,
                nonce: balance_proof.nonce,
                channel: balance_proof.channel_identifier,
                transferred_amount: balance_proof.transferred_amount,
                locked_amount: balance_proof.locked_amount,
                locksroot: balance_proof.locksroot,
                signature: Signature::EMPTY,
            });
            ctx.sign_and_send(*recipient, message).await
        }
        Event::SendProcessed {
            recipient,
            message_identifier,
        } => {
            let message = Message::Processed(Processed {
                message_identifier: *message_identifier,
                signature: Signature::EMPTY,
            });
            ctx.sign_and_send(*recipient, message).await
        }
        Event::EventPaymentSentSuccess {
            payment_identifier,
            amount,
            target,
        } => {
            info!(
                payment_identifier,
                %amount,
                target = %address_hex(target),
                "Payment sent"
            );
            Ok(())
        }
        Event::EventPaymentReceivedSuccess {
            payment_identifier,
            amount,
            initiator,
        } => {
            info!(
                payment_identifier,
                %amount,
                initiator = %address_hex(initiator),
                "Payment received"
            );
            Ok(())
        }
        Event::EventUnlockSuccess {
            payment_identifier, ..
        } => {
            info!(payment_identifier, "Lock unlocked");
            Ok(())
        }
        Event::EventPaymentSentFailed {
            payment_identifier,
            reason,
        }
        | Event::EventTransferReceivedInvalidDirectTransfer {
            payment_identifier,
            reason,
        }
        | Event::EventInvalidReceivedLockedTransfer {
            payment_identifier,
            reason,
        }
        | Event::EventInvalidSecretRequest {
            payment_identifier,
            reason,
        } => {
            warn!(payment_identifier, %reason, "Payment event rejected");
            Ok(())
        }
        Event::EventInvalidReceivedUnlock { reason } => {
            warn!(%reason, "Unlock rejected");
            Ok(())
        }
    }
}

/// Wire form of a locked transfer; the signature is filled in on send.
pub fn locked_transfer_message(transfer: &LockedTransferState) -> LockedTransfer {
    let proof = &transfer.balance_proof;
    LockedTransfer {
        nonce: proof.nonce,
        chain_id: proof.chain_id,
        message_identifier: transfer.message_identifier,
        payment_identifier: transfer.payment_identifier,
        token_network_address: proof.token_network_identifier,
        token: transfer.token,
        channel: proof.channel_identifier,
        recipient: transfer.recipient,
        target: transfer.target,
        initiator: transfer.initiator,
        locksroot: proof.locksroot,
        lock: transfer.lock.clone(),
        transferred_amount: proof.transferred_amount,
        locked_amount: proof.locked_amount,
        fee: transfer.fee,
        signature: Signature::EMPTY,
    }
}

fn swap_for_secrethash<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    secrethash: &SecretHash,
) -> Result<Option<U256>, DispatchError> {
    match ctx.storage().get_crosstransaction_by_r(secrethash) {
        Ok(record) => Ok(Some(record.identifier)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Sign the inner transfer, embed it, then sign the envelope.
async fn send_cross_locked_transfer<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    recipient: Address,
    transfer: LockedTransfer,
    cross_id: U256,
    payment_string: String,
) -> Result<(), DispatchError> {
    let mut transfer = transfer;
    transfer.signature = ctx
        .signature_for(&Message::LockedTransfer(transfer.clone()))
        .await?;
    let message = Message::CrossLockedTransfer(CrossLockedTransfer {
        transfer,
        cross_id,
        payment_string,
        signature: Signature::EMPTY,
    });
    ctx.sign_and_send(recipient, message).await
}

async fn send_cross_secret_request<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    recipient: Address,
    request: SecretRequest,
    cross_id: U256,
) -> Result<(), DispatchError> {
    let mut request = request;
    request.signature = ctx
        .signature_for(&Message::SecretRequest(request.clone()))
        .await?;
    let message = Message::CrossSecretRequest(CrossSecretRequest {
        request,
        cross_id,
        signature: Signature::EMPTY,
    });
    ctx.sign_and_send(recipient, message).await
}
