//! # Swap Handlers
//!
//! Negotiation of a cross-chain swap on top of the channel layer.
//!
//! ```text
//! Initiator (A)                                   Responder (B)
//!   CREATED ──CrossTransaction(cross_type=1)──→ CREATED → ACCEPT_SENT
//!  ACCEPTED ←────────AcceptCross(1)──────────── ACCEPT_SENT
//!           ──────CrossLockedTransfer─────────→ LOCKED (hash_r known)
//!   PENDING ←─────CrossSecretRequest─────────── LOCKED
//!  SECRET_READY (off-chain leg paid)
//!    SYNCED ──RevealSecret + AcceptCross(7)───→ SYNCED
//! ```
//!
//! Every row mutation is a read-modify-write under the storage write lock,
//! so two handlers racing on one swap cannot lose each other's update.
//!
//! A swap enters through [`start_swap`] on the initiator. The network path
//! only ever sees `cross_type = 1`.

use shared_types::{address_hex, secrethash, Secret, Signature, U256};
use tracing::{debug, warn};
use xc_01_wire_codec::{
    AcceptCode, AcceptCross, CrossLockedTransfer, CrossSecretRequest, CrossTransaction, CrossType,
    Message,
};
use xc_02_cross_swap::{CrossTransactionRecord, SwapStatus};
use xc_03_storage::{KeyValueStore, StateSerializer};
use xc_05_transfer::{get_best_routes, Event, StateChange};
use xc_telemetry::{log_swap_event, SWAP_TRANSITIONS};

use crate::adapters::recover_sender;
use crate::context::{CrossPayment, NodeContext};
use crate::dispatcher::{handle_message_lockedtransfer, secret_request_change};
use crate::domain::DispatchError;

// =============================================================================
// INBOUND SWAP MESSAGES
// =============================================================================

/// Swap-initiate from a peer: record the swap and answer with an accept.
///
/// A `cross_type = 0` request is the local user's and never valid off the
/// wire; it goes through [`start_swap`].
pub async fn handle_crosstransaction<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    message: CrossTransaction,
) -> Result<(), DispatchError> {
    if message.cross_type != CrossType::Remote {
        return Err(DispatchError::Rejected(
            "locally originated swap-initiate received from the network".into(),
        ));
    }
    let sender = recover_sender(&Message::CrossTransaction(message.clone()))?;
    if sender != message.initiator_address {
        return Err(DispatchError::InvalidSignature(
            "swap-initiate not signed by its initiator".into(),
        ));
    }
    ctx.storage()
        .create_crosstransaction(&CrossTransactionRecord::from_request(&message))?;
    advance(ctx, message.identifier, SwapStatus::AcceptSent)?;

    let accept = AcceptCross {
        message_identifier: rand::random(),
        initiator_address: message.initiator_address,
        target_address: message.target_address,
        identifier: message.identifier,
        accept: AcceptCode::Accept,
        signature: Signature::EMPTY,
    };
    ctx.sign_and_send(message.initiator_address, Message::AcceptCross(accept))
        .await
}

/// Accept from the counterparty.
///
/// A sync-ack closes the swap. A plain accept moves the initiator to
/// ACCEPTED and starts the locked transfer that funds the swap.
pub async fn handle_acceptcross<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    message: AcceptCross,
) -> Result<(), DispatchError> {
    let identifier = message.identifier;
    let record = ctx.storage().get_crosstransaction_by_identifier(identifier)?;
    let sender = recover_sender(&Message::AcceptCross(message.clone()))?;
    if sender != record.counterparty_of(&ctx.address()) {
        return Err(DispatchError::InvalidSignature(
            "accept not signed by the swap counterparty".into(),
        ));
    }

    match message.accept {
        AcceptCode::SyncAck => {
            advance(ctx, identifier, SwapStatus::Synced)?;
            Ok(())
        }
        AcceptCode::Accept => {
            advance(ctx, identifier, SwapStatus::Accepted)?;
            let swap_leg = ctx.swap_leg();
            ctx.bounded("swap_leg", async {
                swap_leg
                    .start_send_crosstransfer(identifier)
                    .await
                    .map_err(DispatchError::from)
            })
            .await
        }
    }
}

/// Locked transfer bound to a swap.
///
/// As target: apply the transfer, and only once the channel accepts it
/// leave the row LOCKED, notify the swap leg and pay the attached invoice.
/// A rejected transfer restores the row and touches no collaborator. Any
/// other node forwards it as an ordinary locked transfer.
pub async fn handle_crosslockedtransfer<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    message: CrossLockedTransfer,
) -> Result<(), DispatchError> {
    let outer = recover_sender(&Message::CrossLockedTransfer(message.clone()))?;
    let CrossLockedTransfer {
        transfer,
        cross_id,
        payment_string,
        ..
    } = message;
    let sender = recover_sender(&Message::LockedTransfer(transfer.clone()))?;
    if sender != outer {
        return Err(DispatchError::InvalidSignature(
            "embedded transfer signed by a different key".into(),
        ));
    }

    if transfer.target != ctx.address() {
        handle_message_lockedtransfer(ctx, sender, transfer).await?;
        return Ok(());
    }

    // The hashlock must be on the row while the transfer is applied: the
    // secret request it triggers is looked up by it.
    let hash_r = transfer.lock.secrethash;
    let mut previous = None;
    ctx.storage().update_crosstransaction(cross_id, |row| {
        previous = Some((row.status, row.hash_r));
        row.transition_to(SwapStatus::Locked)?;
        row.hash_r = Some(hash_r);
        Ok::<_, DispatchError>(())
    })?;

    let rejection = match handle_message_lockedtransfer(ctx, sender, transfer.clone()).await {
        Ok(events) => events.into_iter().find_map(|event| match event {
            Event::EventInvalidReceivedLockedTransfer { reason, .. } => Some(
                DispatchError::Rejected(format!("swap transfer refused: {reason}")),
            ),
            _ => None,
        }),
        Err(e) => Some(e),
    };
    if let Some(err) = rejection {
        if let Some((status, hash_r)) = previous {
            ctx.storage().update_crosstransaction(cross_id, |row| {
                row.status = status;
                row.hash_r = hash_r;
                Ok::<_, DispatchError>(())
            })?;
        }
        log_swap_event!(warn, "Swap transfer rejected", cross_id, error = %err);
        return Err(err);
    }
    record_transition(cross_id, SwapStatus::Locked);

    let swap_leg = ctx.swap_leg();
    ctx.bounded("swap_leg", async {
        swap_leg
            .cross_handle_received_locked_transfer(&transfer, cross_id)
            .await
            .map_err(DispatchError::from)
    })
    .await?;

    let payment_requester = ctx.payment_requester();
    ctx.bounded("payment_requester", async {
        payment_requester
            .send_payment_request(&payment_string)
            .await
            .map_err(DispatchError::from)
    })
    .await
}

/// Secret request bound to a swap.
///
/// Applied at once when the secret is already ready; otherwise parked
/// until [`on_secret_ready`] releases it.
pub async fn handle_crosssecretrequest<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    message: CrossSecretRequest,
) -> Result<(), DispatchError> {
    let outer = recover_sender(&Message::CrossSecretRequest(message.clone()))?;
    let CrossSecretRequest {
        request, cross_id, ..
    } = message;
    let sender = recover_sender(&Message::SecretRequest(request.clone()))?;
    if sender != outer {
        return Err(DispatchError::InvalidSignature(
            "embedded secret request signed by a different key".into(),
        ));
    }
    let change = secret_request_change(sender, &request);

    // Parking first keeps the status check and the link in one row update.
    let parked_id = ctx.storage().park_state_change(&change)?;
    let mut apply_now = false;
    ctx.storage().update_crosstransaction(cross_id, |row| {
        if row.status == SwapStatus::SecretReady {
            apply_now = true;
            return Ok(());
        }
        row.transition_to(SwapStatus::SecretRequestPending)?;
        row.state_change_id = Some(parked_id);
        Ok::<_, DispatchError>(())
    })
    .inspect_err(|_| discard_parked(ctx, cross_id, parked_id))?;

    if !apply_now {
        record_transition(cross_id, SwapStatus::SecretRequestPending);
        log_swap_event!(info, "Secret request parked", cross_id, parked_id);
        return Ok(());
    }

    discard_parked(ctx, cross_id, parked_id);
    let (state_change_id, _) = ctx.log_state_change(change).await?;
    complete_swap(ctx, cross_id, state_change_id).await
}

// =============================================================================
// LOCAL SIGNALS
// =============================================================================

/// Start a swap requested by the local user: record it, forward it to the
/// target as a signed peer swap-initiate and start the on-chain leg.
///
/// Only this node can be the initiator.
pub async fn start_swap<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    request: CrossTransaction,
) -> Result<(), DispatchError> {
    if request.initiator_address != ctx.address() {
        return Err(DispatchError::Rejected(format!(
            "swap initiator {} is not this node",
            address_hex(&request.initiator_address)
        )));
    }
    ctx.storage()
        .create_crosstransaction(&CrossTransactionRecord::from_request(&request))?;
    log_swap_event!(info, "Swap originated locally", request.identifier);

    let mut forwarded = request;
    forwarded.cross_type = CrossType::Remote;
    forwarded.signature = ctx
        .signature_for(&Message::CrossTransaction(forwarded.clone()))
        .await?;
    ctx.send(
        forwarded.target_address,
        Message::CrossTransaction(forwarded.clone()),
    )
    .await?;

    let swap_leg = ctx.swap_leg();
    ctx.bounded("swap_leg", async {
        swap_leg
            .start_crosstransaction(&forwarded)
            .await
            .map_err(DispatchError::from)
    })
    .await
}

/// The off-chain leg delivered the secret for swap `identifier`.
///
/// Records it, marks the row SECRET_READY and, when a secret request was
/// parked, applies it and closes the swap. Repeating the call on a
/// SECRET_READY row still linked to a parked request finishes that request.
pub async fn on_secret_ready<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    identifier: U256,
    secret: Secret,
) -> Result<(), DispatchError> {
    let mut parked_id = None;
    let mut already_ready = false;
    ctx.storage().update_crosstransaction(identifier, |row| {
        row.reveal_secret(secret)?;
        if row.status == SwapStatus::SecretReady {
            already_ready = true;
            parked_id = row.state_change_id;
            return Ok(());
        }
        let pending = row.status == SwapStatus::SecretRequestPending;
        row.transition_to(SwapStatus::SecretReady)?;
        if pending {
            parked_id = row.state_change_id;
        }
        Ok::<_, DispatchError>(())
    })?;
    if !already_ready {
        record_transition(identifier, SwapStatus::SecretReady);
    }

    let Some(parked_id) = parked_id else {
        debug!("No secret request parked yet");
        return Ok(());
    };
    if already_ready {
        log_swap_event!(info, "Resuming parked secret request", identifier, parked_id);
    }
    let change: StateChange = ctx.storage().get_parked_state_change(parked_id)?;
    let (state_change_id, _) = ctx.log_state_change(change).await?;
    let completed = complete_swap(ctx, identifier, state_change_id).await;
    discard_parked(ctx, identifier, parked_id);
    completed
}

/// Finish every SECRET_READY swap still linked to a parked secret request.
///
/// Run once at startup; such a row is left by a stop between the status
/// write and the release of the request.
pub async fn resume_parked_swaps<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
) -> Result<usize, DispatchError> {
    let stuck: Vec<(U256, Secret)> = ctx
        .storage()
        .get_all_crosstransactions()?
        .into_iter()
        .filter(|row| row.status == SwapStatus::SecretReady && row.state_change_id.is_some())
        .filter_map(|row| row.r.map(|secret| (row.identifier, secret)))
        .collect();

    let mut resumed = 0;
    for (identifier, secret) in stuck {
        match on_secret_ready(ctx, identifier, secret).await {
            Ok(()) => resumed += 1,
            Err(e) => log_swap_event!(
                warn,
                "Cannot resume parked secret request",
                identifier,
                error = %e
            ),
        }
    }
    Ok(resumed)
}

/// [`on_secret_ready`] for whichever swap is locked under `secret`.
pub async fn resolve_secret<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    secret: Secret,
) -> Result<U256, DispatchError> {
    let record = ctx.storage().get_crosstransaction_by_r(&secrethash(&secret))?;
    on_secret_ready(ctx, record.identifier, secret).await?;
    Ok(record.identifier)
}

/// Fund an accepted swap: start a mediated payment of the swap's ETH amount
/// to its target, sent as a swap transfer carrying `payment_string`.
///
/// Swap-leg drivers call this from `start_send_crosstransfer`.
pub async fn send_crosstransfer<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    identifier: U256,
    secret: Secret,
    payment_string: String,
    expiration: U256,
) -> Result<Vec<Event>, DispatchError> {
    let record = ctx.storage().get_crosstransaction_by_identifier(identifier)?;
    let hash_r = secrethash(&secret);
    ctx.storage()
        .change_crosstransaction_r(identifier, hash_r, None)?;

    let our_address = ctx.address();
    let routes = ctx.with_chain_state(|state| {
        get_best_routes(
            state,
            &record.token_network_identifier,
            &our_address,
            &record.target_address,
            record.send_eth_amount,
            None,
        )
    });
    ctx.register_cross_payment(
        hash_r,
        CrossPayment {
            identifier,
            payment_string,
        },
    );

    let change = StateChange::ActionInitInitiator {
        token_network_identifier: record.token_network_identifier,
        payment_identifier: identifier.low_u64(),
        amount: record.send_eth_amount,
        target: record.target_address,
        secret,
        expiration,
        routes,
    };
    let result = ctx.handle_state_change(change).await;
    // Left over only when no locked transfer went out.
    if ctx.take_cross_payment(&hash_r).is_some() {
        log_swap_event!(warn, "Swap transfer found no route", identifier);
    }
    result
}

// =============================================================================
// HELPERS
// =============================================================================

/// Apply the (now released) secret request's result to the row and tell
/// the counterparty both sides are in sync.
async fn complete_swap<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    identifier: U256,
    state_change_id: u64,
) -> Result<(), DispatchError> {
    let record = ctx.storage().update_crosstransaction(identifier, |row| {
        row.state_change_id = Some(state_change_id);
        row.transition_to(SwapStatus::Synced)?;
        Ok::<_, DispatchError>(())
    })?;
    record_transition(identifier, SwapStatus::Synced);

    let ack = AcceptCross {
        message_identifier: rand::random(),
        initiator_address: record.initiator_address,
        target_address: record.target_address,
        identifier,
        accept: AcceptCode::SyncAck,
        signature: Signature::EMPTY,
    };
    ctx.sign_and_send(record.target_address, Message::AcceptCross(ack))
        .await
}

/// Drop a parked request whose row no longer needs it. A leftover entry is
/// unreachable, so failure is only logged.
fn discard_parked<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    identifier: U256,
    parked_id: u64,
) {
    if let Err(e) = ctx.storage().remove_parked_state_change(parked_id) {
        warn!(
            identifier = %format!("{:#x}", identifier),
            parked_id,
            error = %e,
            "Cannot remove parked state change"
        );
    }
}

/// Validated status change of one row.
fn advance<KV: KeyValueStore, S: StateSerializer>(
    ctx: &NodeContext<KV, S>,
    identifier: U256,
    status: SwapStatus,
) -> Result<CrossTransactionRecord, DispatchError> {
    let record = ctx.storage().update_crosstransaction(identifier, |row| {
        row.transition_to(status)?;
        Ok::<_, DispatchError>(())
    })?;
    record_transition(identifier, status);
    Ok(record)
}

fn record_transition(identifier: U256, status: SwapStatus) {
    SWAP_TRANSITIONS.with_label_values(&[status.as_str()]).inc();
    log_swap_event!(info, "Swap status changed", identifier, status = status.as_str());
}
