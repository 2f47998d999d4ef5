//! # Codec
//!
//! `decode` and `encode` over the closed `Message` enum. Each kind reads and
//! writes its fields in layout order; offsets come from the cursor.

mod reader;
mod writer;

use serde::{Deserialize, Serialize};
use shared_types::{Signature, SIGNATURE_LEN};
use tracing::{error, warn};

use crate::domain::fields::*;
use crate::domain::*;
use reader::FieldReader;
use writer::FieldWriter;

/// A decoded peer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Processed(Processed),
    Ping(Ping),
    Pong(Pong),
    SecretRequest(SecretRequest),
    Secret(Unlock),
    DirectTransfer(DirectTransfer),
    LockedTransfer(LockedTransfer),
    RefundTransfer(LockedTransfer),
    RevealSecret(RevealSecret),
    Delivered(Delivered),
    CrossTransaction(CrossTransaction),
    AcceptCross(AcceptCross),
    CrossLockedTransfer(CrossLockedTransfer),
    CrossSecretRequest(CrossSecretRequest),
}

impl Message {
    pub fn command_id(&self) -> CommandId {
        match self {
            Message::Processed(_) => CommandId::Processed,
            Message::Ping(_) => CommandId::Ping,
            Message::Pong(_) => CommandId::Pong,
            Message::SecretRequest(_) => CommandId::SecretRequest,
            Message::Secret(_) => CommandId::Secret,
            Message::DirectTransfer(_) => CommandId::DirectTransfer,
            Message::LockedTransfer(_) => CommandId::LockedTransfer,
            Message::RefundTransfer(_) => CommandId::RefundTransfer,
            Message::RevealSecret(_) => CommandId::RevealSecret,
            Message::Delivered(_) => CommandId::Delivered,
            Message::CrossTransaction(_) => CommandId::CrossTransaction,
            Message::AcceptCross(_) => CommandId::AcceptCross,
            Message::CrossLockedTransfer(_) => CommandId::CrossLockedTransfer,
            Message::CrossSecretRequest(_) => CommandId::CrossSecretRequest,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.command_id().name()
    }

    /// Identifier a Processed/Delivered acknowledgement would refer to.
    pub fn message_identifier(&self) -> Option<u64> {
        match self {
            Message::Processed(m) => Some(m.message_identifier),
            Message::Ping(_) | Message::Pong(_) | Message::Delivered(_) => None,
            Message::SecretRequest(m) => Some(m.message_identifier),
            Message::Secret(m) => Some(m.message_identifier),
            Message::DirectTransfer(m) => Some(m.message_identifier),
            Message::LockedTransfer(m) | Message::RefundTransfer(m) => {
                Some(m.message_identifier)
            }
            Message::RevealSecret(m) => Some(m.message_identifier),
            Message::CrossTransaction(m) => Some(m.message_identifier),
            Message::AcceptCross(m) => Some(m.message_identifier),
            Message::CrossLockedTransfer(m) => Some(m.transfer.message_identifier),
            Message::CrossSecretRequest(m) => Some(m.request.message_identifier),
        }
    }

    /// Outer (trailing) signature.
    pub fn signature(&self) -> &Signature {
        match self {
            Message::Processed(m) => &m.signature,
            Message::Ping(m) => &m.signature,
            Message::Pong(m) => &m.signature,
            Message::SecretRequest(m) => &m.signature,
            Message::Secret(m) => &m.signature,
            Message::DirectTransfer(m) => &m.signature,
            Message::LockedTransfer(m) | Message::RefundTransfer(m) => &m.signature,
            Message::RevealSecret(m) => &m.signature,
            Message::Delivered(m) => &m.signature,
            Message::CrossTransaction(m) => &m.signature,
            Message::AcceptCross(m) => &m.signature,
            Message::CrossLockedTransfer(m) => &m.signature,
            Message::CrossSecretRequest(m) => &m.signature,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        let slot = match self {
            Message::Processed(m) => &mut m.signature,
            Message::Ping(m) => &mut m.signature,
            Message::Pong(m) => &mut m.signature,
            Message::SecretRequest(m) => &mut m.signature,
            Message::Secret(m) => &mut m.signature,
            Message::DirectTransfer(m) => &mut m.signature,
            Message::LockedTransfer(m) | Message::RefundTransfer(m) => &mut m.signature,
            Message::RevealSecret(m) => &mut m.signature,
            Message::Delivered(m) => &mut m.signature,
            Message::CrossTransaction(m) => &mut m.signature,
            Message::AcceptCross(m) => &mut m.signature,
            Message::CrossLockedTransfer(m) => &mut m.signature,
            Message::CrossSecretRequest(m) => &mut m.signature,
        };
        *slot = signature;
    }

    /// Encoded bytes the trailing signature covers.
    pub fn signed_payload(&self) -> Result<Vec<u8>, DecodeError> {
        let mut bytes = encode(self)?;
        bytes.truncate(bytes.len() - SIGNATURE_LEN);
        Ok(bytes)
    }
}

/// Declared layout for a command id.
pub fn layout(cmd: CommandId) -> &'static [FieldSpec] {
    match cmd {
        CommandId::Processed => PROCESSED_LAYOUT,
        CommandId::Ping => PING_LAYOUT,
        CommandId::Pong => PONG_LAYOUT,
        CommandId::SecretRequest => SECRET_REQUEST_LAYOUT,
        CommandId::Secret => SECRET_LAYOUT,
        CommandId::DirectTransfer => DIRECT_TRANSFER_LAYOUT,
        CommandId::LockedTransfer | CommandId::RefundTransfer => LOCKED_TRANSFER_LAYOUT,
        CommandId::RevealSecret => REVEAL_SECRET_LAYOUT,
        CommandId::Delivered => DELIVERED_LAYOUT,
        CommandId::CrossTransaction => CROSS_TRANSACTION_LAYOUT,
        CommandId::AcceptCross => ACCEPT_CROSS_LAYOUT,
        CommandId::CrossLockedTransfer => CROSS_LOCKED_TRANSFER_LAYOUT,
        CommandId::CrossSecretRequest => CROSS_SECRET_REQUEST_LAYOUT,
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Parse one message. Failures are logged here and returned for the caller
/// to drop.
pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
    let result = decode_inner(data);
    match &result {
        Err(DecodeError::EmptyInput) => warn!("Received empty message"),
        Err(DecodeError::UnknownCommand(cmdid)) => error!(cmdid, "Unknown command id"),
        Err(e) => error!(error = %e, len = data.len(), "Invalid message"),
        Ok(_) => {}
    }
    result
}

fn decode_inner(data: &[u8]) -> Result<Message, DecodeError> {
    let first = *data.first().ok_or(DecodeError::EmptyInput)?;
    let cmd = CommandId::try_from(first)?;
    let fields = layout(cmd);
    let expected = encoded_len(fields);
    if data.len() != expected {
        return Err(DecodeError::MalformedMessage {
            kind: cmd.name(),
            reason: format!("expected {} bytes, got {}", expected, data.len()),
        });
    }

    let mut r = FieldReader::new(cmd.name(), data, fields);
    let message = match cmd {
        CommandId::Processed => Message::Processed(Processed {
            message_identifier: r.uint64(&MESSAGE_IDENTIFIER)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::Ping => Message::Ping(Ping {
            nonce: r.uint64(&NONCE)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::Pong => Message::Pong(Pong {
            nonce: r.uint64(&NONCE)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::Delivered => Message::Delivered(Delivered {
            delivered_message_identifier: r.uint64(&DELIVERED_MESSAGE_IDENTIFIER)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::SecretRequest => {
            let mut request = read_secret_request_body(&mut r)?;
            request.signature = r.signature(&SIGNATURE)?;
            Message::SecretRequest(request)
        }
        CommandId::CrossSecretRequest => {
            let mut request = read_secret_request_body(&mut r)?;
            let cross_id = r.uint256(&CROSS_ID)?;
            request.signature = r.signature(&SECRET_REQUEST_SIGNATURE)?;
            Message::CrossSecretRequest(CrossSecretRequest {
                request,
                cross_id,
                signature: r.signature(&SIGNATURE)?,
            })
        }
        CommandId::Secret => Message::Secret(Unlock {
            chain_id: r.uint256(&CHAIN_ID)?,
            message_identifier: r.uint64(&MESSAGE_IDENTIFIER)?,
            payment_identifier: r.uint64(&PAYMENT_IDENTIFIER)?,
            token_network_address: r.array(&TOKEN_NETWORK_ADDRESS)?,
            secret: r.array(&SECRET)?,
            nonce: r.uint64(&NONCE)?,
            channel: r.array(&CHANNEL)?,
            transferred_amount: r.uint256(&TRANSFERRED_AMOUNT)?,
            locked_amount: r.uint256(&LOCKED_AMOUNT)?,
            locksroot: r.array(&LOCKSROOT)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::RevealSecret => Message::RevealSecret(RevealSecret {
            message_identifier: r.uint64(&MESSAGE_IDENTIFIER)?,
            secret: r.array(&SECRET)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::DirectTransfer => Message::DirectTransfer(DirectTransfer {
            nonce: r.uint64(&NONCE)?,
            chain_id: r.uint256(&CHAIN_ID)?,
            message_identifier: r.uint64(&MESSAGE_IDENTIFIER)?,
            payment_identifier: r.uint64(&PAYMENT_IDENTIFIER)?,
            token_network_address: r.array(&TOKEN_NETWORK_ADDRESS)?,
            token: r.array(&TOKEN)?,
            channel: r.array(&CHANNEL)?,
            recipient: r.array(&RECIPIENT)?,
            transferred_amount: r.uint256(&TRANSFERRED_AMOUNT)?,
            locked_amount: r.uint256(&LOCKED_AMOUNT)?,
            locksroot: r.array(&LOCKSROOT)?,
            signature: r.signature(&SIGNATURE)?,
        }),
        CommandId::LockedTransfer | CommandId::RefundTransfer => {
            let mut transfer = read_transfer_body(&mut r)?;
            transfer.signature = r.signature(&SIGNATURE)?;
            if cmd == CommandId::LockedTransfer {
                Message::LockedTransfer(transfer)
            } else {
                Message::RefundTransfer(transfer)
            }
        }
        CommandId::CrossLockedTransfer => {
            let mut transfer = read_transfer_body(&mut r)?;
            let cross_id = r.uint256(&CROSS_ID)?;
            let payment_string = r.text(&PAYMENT_STRING)?;
            transfer.signature = r.signature(&LOCKED_TRANSFER_SIGNATURE)?;
            Message::CrossLockedTransfer(CrossLockedTransfer {
                transfer,
                cross_id,
                payment_string,
                signature: r.signature(&SIGNATURE)?,
            })
        }
        CommandId::CrossTransaction => {
            let message_identifier = r.uint64(&MESSAGE_IDENTIFIER)?;
            let initiator_address = r.array(&INITIATOR_ADDRESS)?;
            let target_address = r.array(&TARGET_ADDRESS)?;
            let token_network_identifier = r.array(&TOKEN_NETWORK_IDENTIFIER)?;
            let send_eth_amount = r.uint256(&SEND_ETH_AMOUNT)?;
            let send_btc_amount = r.uint256(&SEND_BTC_AMOUNT)?;
            let receive_btc_address = r.text(&RECEIVE_BTC_ADDRESS)?;
            // The declared bound already rejects anything but 0 and 1.
            let cross_type = CrossType::try_from(r.uint8(&CROSS_TYPE)?).map_err(|v| {
                DecodeError::MalformedMessage {
                    kind: cmd.name(),
                    reason: format!("unknown cross_type {}", v),
                }
            })?;
            Message::CrossTransaction(CrossTransaction {
                message_identifier,
                initiator_address,
                target_address,
                token_network_identifier,
                send_eth_amount,
                send_btc_amount,
                receive_btc_address,
                cross_type,
                identifier: r.uint256(&IDENTIFIER)?,
                signature: r.signature(&SIGNATURE)?,
            })
        }
        CommandId::AcceptCross => {
            let message_identifier = r.uint64(&MESSAGE_IDENTIFIER)?;
            let initiator_address = r.array(&INITIATOR_ADDRESS)?;
            let target_address = r.array(&TARGET_ADDRESS)?;
            let identifier = r.uint256(&IDENTIFIER)?;
            let accept = AcceptCode::try_from(r.uint8(&ACCEPT)?).map_err(|v| {
                DecodeError::MalformedMessage {
                    kind: cmd.name(),
                    reason: format!("unknown accept code {}", v),
                }
            })?;
            Message::AcceptCross(AcceptCross {
                message_identifier,
                initiator_address,
                target_address,
                identifier,
                accept,
                signature: r.signature(&SIGNATURE)?,
            })
        }
    };
    r.finish()?;
    Ok(message)
}

fn read_secret_request_body(r: &mut FieldReader<'_>) -> Result<SecretRequest, DecodeError> {
    Ok(SecretRequest {
        message_identifier: r.uint64(&MESSAGE_IDENTIFIER)?,
        payment_identifier: r.uint64(&PAYMENT_IDENTIFIER)?,
        secrethash: r.array(&SECRETHASH)?,
        amount: r.uint256(&AMOUNT)?,
        signature: Signature::EMPTY,
    })
}

fn read_transfer_body(r: &mut FieldReader<'_>) -> Result<LockedTransfer, DecodeError> {
    let nonce = r.uint64(&NONCE)?;
    let chain_id = r.uint256(&CHAIN_ID)?;
    let message_identifier = r.uint64(&MESSAGE_IDENTIFIER)?;
    let payment_identifier = r.uint64(&PAYMENT_IDENTIFIER)?;
    let expiration = r.uint256(&EXPIRATION)?;
    let token_network_address = r.array(&TOKEN_NETWORK_ADDRESS)?;
    let token = r.array(&TOKEN)?;
    let channel = r.array(&CHANNEL)?;
    let recipient = r.array(&RECIPIENT)?;
    let target = r.array(&TARGET)?;
    let initiator = r.array(&INITIATOR)?;
    let locksroot = r.array(&LOCKSROOT)?;
    let secrethash = r.array(&SECRETHASH)?;
    let transferred_amount = r.uint256(&TRANSFERRED_AMOUNT)?;
    let locked_amount = r.uint256(&LOCKED_AMOUNT)?;
    let amount = r.uint256(&AMOUNT)?;
    let fee = r.uint256(&FEE)?;
    Ok(LockedTransfer {
        nonce,
        chain_id,
        message_identifier,
        payment_identifier,
        token_network_address,
        token,
        channel,
        recipient,
        target,
        initiator,
        locksroot,
        lock: Lock {
            amount,
            expiration,
            secrethash,
        },
        transferred_amount,
        locked_amount,
        fee,
        signature: Signature::EMPTY,
    })
}

// =============================================================================
// ENCODE
// =============================================================================

/// Serialize a message to its exact declared width.
pub fn encode(message: &Message) -> Result<Vec<u8>, DecodeError> {
    let cmd = message.command_id();
    let mut w = FieldWriter::new(cmd, layout(cmd));
    match message {
        Message::Processed(m) => {
            w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::Ping(Ping { nonce, signature }) | Message::Pong(Pong { nonce, signature }) => {
            w.uint64(&NONCE, *nonce)?;
            w.signature(&SIGNATURE, signature);
        }
        Message::Delivered(m) => {
            w.uint64(&DELIVERED_MESSAGE_IDENTIFIER, m.delivered_message_identifier)?;
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::SecretRequest(m) => {
            write_secret_request_body(&mut w, m)?;
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::CrossSecretRequest(m) => {
            write_secret_request_body(&mut w, &m.request)?;
            w.uint256(&CROSS_ID, m.cross_id);
            w.signature(&SECRET_REQUEST_SIGNATURE, &m.request.signature);
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::Secret(m) => {
            w.uint256(&CHAIN_ID, m.chain_id);
            w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
            w.uint64(&PAYMENT_IDENTIFIER, m.payment_identifier)?;
            w.bytes(&TOKEN_NETWORK_ADDRESS, &m.token_network_address);
            w.bytes(&SECRET, &m.secret);
            w.uint64(&NONCE, m.nonce)?;
            w.bytes(&CHANNEL, &m.channel);
            w.uint256(&TRANSFERRED_AMOUNT, m.transferred_amount);
            w.uint256(&LOCKED_AMOUNT, m.locked_amount);
            w.bytes(&LOCKSROOT, &m.locksroot);
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::RevealSecret(m) => {
            w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
            w.bytes(&SECRET, &m.secret);
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::DirectTransfer(m) => {
            w.uint64(&NONCE, m.nonce)?;
            w.uint256(&CHAIN_ID, m.chain_id);
            w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
            w.uint64(&PAYMENT_IDENTIFIER, m.payment_identifier)?;
            w.bytes(&TOKEN_NETWORK_ADDRESS, &m.token_network_address);
            w.bytes(&TOKEN, &m.token);
            w.bytes(&CHANNEL, &m.channel);
            w.bytes(&RECIPIENT, &m.recipient);
            w.uint256(&TRANSFERRED_AMOUNT, m.transferred_amount);
            w.uint256(&LOCKED_AMOUNT, m.locked_amount);
            w.bytes(&LOCKSROOT, &m.locksroot);
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::LockedTransfer(m) | Message::RefundTransfer(m) => {
            write_transfer_body(&mut w, m)?;
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::CrossLockedTransfer(m) => {
            write_transfer_body(&mut w, &m.transfer)?;
            w.uint256(&CROSS_ID, m.cross_id);
            w.text(&PAYMENT_STRING, &m.payment_string)?;
            w.signature(&LOCKED_TRANSFER_SIGNATURE, &m.transfer.signature);
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::CrossTransaction(m) => {
            w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
            w.bytes(&INITIATOR_ADDRESS, &m.initiator_address);
            w.bytes(&TARGET_ADDRESS, &m.target_address);
            w.bytes(&TOKEN_NETWORK_IDENTIFIER, &m.token_network_identifier);
            w.uint256(&SEND_ETH_AMOUNT, m.send_eth_amount);
            w.uint256(&SEND_BTC_AMOUNT, m.send_btc_amount);
            w.text(&RECEIVE_BTC_ADDRESS, &m.receive_btc_address)?;
            w.uint8(&CROSS_TYPE, m.cross_type as u8)?;
            w.uint256(&IDENTIFIER, m.identifier);
            w.signature(&SIGNATURE, &m.signature);
        }
        Message::AcceptCross(m) => {
            w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
            w.bytes(&INITIATOR_ADDRESS, &m.initiator_address);
            w.bytes(&TARGET_ADDRESS, &m.target_address);
            w.uint256(&IDENTIFIER, m.identifier);
            w.uint8(&ACCEPT, m.accept as u8)?;
            w.signature(&SIGNATURE, &m.signature);
        }
    }
    Ok(w.finish())
}

fn write_secret_request_body(w: &mut FieldWriter, m: &SecretRequest) -> Result<(), DecodeError> {
    w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
    w.uint64(&PAYMENT_IDENTIFIER, m.payment_identifier)?;
    w.bytes(&SECRETHASH, &m.secrethash);
    w.uint256(&AMOUNT, m.amount);
    Ok(())
}

fn write_transfer_body(w: &mut FieldWriter, m: &LockedTransfer) -> Result<(), DecodeError> {
    w.uint64(&NONCE, m.nonce)?;
    w.uint256(&CHAIN_ID, m.chain_id);
    w.uint64(&MESSAGE_IDENTIFIER, m.message_identifier)?;
    w.uint64(&PAYMENT_IDENTIFIER, m.payment_identifier)?;
    w.uint256(&EXPIRATION, m.lock.expiration);
    w.bytes(&TOKEN_NETWORK_ADDRESS, &m.token_network_address);
    w.bytes(&TOKEN, &m.token);
    w.bytes(&CHANNEL, &m.channel);
    w.bytes(&RECIPIENT, &m.recipient);
    w.bytes(&TARGET, &m.target);
    w.bytes(&INITIATOR, &m.initiator);
    w.bytes(&LOCKSROOT, &m.locksroot);
    w.bytes(&SECRETHASH, &m.lock.secrethash);
    w.uint256(&TRANSFERRED_AMOUNT, m.transferred_amount);
    w.uint256(&LOCKED_AMOUNT, m.locked_amount);
    w.uint256(&AMOUNT, m.lock.amount);
    w.uint256(&FEE, m.fee);
    Ok(())
}
