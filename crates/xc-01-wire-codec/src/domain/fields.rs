//! # Field Layouts
//!
//! Every message kind is a 1-byte command id, three padding bytes and an
//! ordered list of fixed-width fields. Offsets are never written down: they
//! fall out of the cumulative widths of the layout table, so a field can be
//! added to one kind without touching any other.

use shared_types::SIGNATURE_LEN;

/// Command id plus padding.
pub const HEADER_LEN: usize = 4;

/// Value domain of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Big-endian unsigned integer, inclusive upper bound.
    Uint(Bound),
    /// Raw bytes, exactly `width` long.
    Bytes,
    /// UTF-8 text right-padded with zero bytes up to `width`.
    Text,
}

/// Upper bound of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Any value the width can hold (`UINT64_MAX`, `UINT256_MAX`).
    Width,
    /// Narrower domain, e.g. enum-valued single bytes.
    Max(u64),
}

/// One named slot in a message layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub width: usize,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn uint(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            kind: FieldKind::Uint(Bound::Width),
        }
    }

    pub const fn bounded(name: &'static str, width: usize, max: u64) -> Self {
        Self {
            name,
            width,
            kind: FieldKind::Uint(Bound::Max(max)),
        }
    }

    pub const fn bytes(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            kind: FieldKind::Bytes,
        }
    }

    pub const fn text(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            kind: FieldKind::Text,
        }
    }
}

/// Total encoded length of a layout, header included.
pub const fn encoded_len(layout: &[FieldSpec]) -> usize {
    let mut total = HEADER_LEN;
    let mut i = 0;
    while i < layout.len() {
        total += layout[i].width;
        i += 1;
    }
    total
}

/// Byte offset of a named field, header included.
pub fn offset_of(layout: &[FieldSpec], name: &str) -> Option<usize> {
    let mut offset = HEADER_LEN;
    for field in layout {
        if field.name == name {
            return Some(offset);
        }
        offset += field.width;
    }
    None
}

// =============================================================================
// FIELD CATALOGUE
// =============================================================================

pub const NONCE: FieldSpec = FieldSpec::uint("nonce", 8);
pub const PAYMENT_IDENTIFIER: FieldSpec = FieldSpec::uint("payment_identifier", 8);
pub const MESSAGE_IDENTIFIER: FieldSpec = FieldSpec::uint("message_identifier", 8);
pub const DELIVERED_MESSAGE_IDENTIFIER: FieldSpec =
    FieldSpec::uint("delivered_message_identifier", 8);

pub const CHAIN_ID: FieldSpec = FieldSpec::uint("chain_id", 32);
pub const EXPIRATION: FieldSpec = FieldSpec::uint("expiration", 32);
pub const TRANSFERRED_AMOUNT: FieldSpec = FieldSpec::uint("transferred_amount", 32);
pub const LOCKED_AMOUNT: FieldSpec = FieldSpec::uint("locked_amount", 32);
pub const AMOUNT: FieldSpec = FieldSpec::uint("amount", 32);
pub const FEE: FieldSpec = FieldSpec::uint("fee", 32);
pub const SEND_ETH_AMOUNT: FieldSpec = FieldSpec::uint("send_eth_amount", 32);
pub const SEND_BTC_AMOUNT: FieldSpec = FieldSpec::uint("send_btc_amount", 32);
pub const IDENTIFIER: FieldSpec = FieldSpec::uint("identifier", 32);
pub const CROSS_ID: FieldSpec = FieldSpec::uint("cross_id", 32);

pub const TOKEN_NETWORK_ADDRESS: FieldSpec = FieldSpec::bytes("token_network_address", 20);
pub const TOKEN_NETWORK_IDENTIFIER: FieldSpec = FieldSpec::bytes("token_network_identifier", 20);
pub const TOKEN: FieldSpec = FieldSpec::bytes("token", 20);
pub const CHANNEL: FieldSpec = FieldSpec::bytes("channel", 20);
pub const RECIPIENT: FieldSpec = FieldSpec::bytes("recipient", 20);
pub const TARGET: FieldSpec = FieldSpec::bytes("target", 20);
pub const INITIATOR: FieldSpec = FieldSpec::bytes("initiator", 20);
pub const INITIATOR_ADDRESS: FieldSpec = FieldSpec::bytes("initiator_address", 20);
pub const TARGET_ADDRESS: FieldSpec = FieldSpec::bytes("target_address", 20);

pub const LOCKSROOT: FieldSpec = FieldSpec::bytes("locksroot", 32);
pub const SECRETHASH: FieldSpec = FieldSpec::bytes("secrethash", 32);
pub const SECRET: FieldSpec = FieldSpec::bytes("secret", 32);

pub const RECEIVE_BTC_ADDRESS: FieldSpec = FieldSpec::text("receive_btc_address", 34);
pub const PAYMENT_STRING: FieldSpec = FieldSpec::text("payment_string", 200);

pub const CROSS_TYPE: FieldSpec = FieldSpec::bounded("cross_type", 1, 1);
pub const ACCEPT: FieldSpec = FieldSpec::bounded("accept", 1, u8::MAX as u64);

pub const LOCKED_TRANSFER_SIGNATURE: FieldSpec =
    FieldSpec::bytes("locked_transfer_signature", SIGNATURE_LEN);
pub const SECRET_REQUEST_SIGNATURE: FieldSpec =
    FieldSpec::bytes("secret_request_signature", SIGNATURE_LEN);
pub const SIGNATURE: FieldSpec = FieldSpec::bytes("signature", SIGNATURE_LEN);

// =============================================================================
// LAYOUTS
// =============================================================================

pub const PROCESSED_LAYOUT: &[FieldSpec] = &[MESSAGE_IDENTIFIER, SIGNATURE];

pub const DELIVERED_LAYOUT: &[FieldSpec] = &[DELIVERED_MESSAGE_IDENTIFIER, SIGNATURE];

pub const PING_LAYOUT: &[FieldSpec] = &[NONCE, SIGNATURE];

pub const PONG_LAYOUT: &[FieldSpec] = &[NONCE, SIGNATURE];

pub const SECRET_REQUEST_LAYOUT: &[FieldSpec] = &[
    MESSAGE_IDENTIFIER,
    PAYMENT_IDENTIFIER,
    SECRETHASH,
    AMOUNT,
    SIGNATURE,
];

pub const CROSS_SECRET_REQUEST_LAYOUT: &[FieldSpec] = &[
    MESSAGE_IDENTIFIER,
    PAYMENT_IDENTIFIER,
    SECRETHASH,
    AMOUNT,
    CROSS_ID,
    SECRET_REQUEST_SIGNATURE,
    SIGNATURE,
];

pub const SECRET_LAYOUT: &[FieldSpec] = &[
    CHAIN_ID,
    MESSAGE_IDENTIFIER,
    PAYMENT_IDENTIFIER,
    TOKEN_NETWORK_ADDRESS,
    SECRET,
    NONCE,
    CHANNEL,
    TRANSFERRED_AMOUNT,
    LOCKED_AMOUNT,
    LOCKSROOT,
    SIGNATURE,
];

pub const REVEAL_SECRET_LAYOUT: &[FieldSpec] = &[MESSAGE_IDENTIFIER, SECRET, SIGNATURE];

pub const DIRECT_TRANSFER_LAYOUT: &[FieldSpec] = &[
    NONCE,
    CHAIN_ID,
    MESSAGE_IDENTIFIER,
    PAYMENT_IDENTIFIER,
    TOKEN_NETWORK_ADDRESS,
    TOKEN,
    CHANNEL,
    RECIPIENT,
    TRANSFERRED_AMOUNT,
    LOCKED_AMOUNT,
    LOCKSROOT,
    SIGNATURE,
];

/// Shared by LockedTransfer and RefundTransfer.
pub const LOCKED_TRANSFER_LAYOUT: &[FieldSpec] = &[
    NONCE,
    CHAIN_ID,
    MESSAGE_IDENTIFIER,
    PAYMENT_IDENTIFIER,
    EXPIRATION,
    TOKEN_NETWORK_ADDRESS,
    TOKEN,
    CHANNEL,
    RECIPIENT,
    TARGET,
    INITIATOR,
    LOCKSROOT,
    SECRETHASH,
    TRANSFERRED_AMOUNT,
    LOCKED_AMOUNT,
    AMOUNT,
    FEE,
    SIGNATURE,
];

pub const CROSS_LOCKED_TRANSFER_LAYOUT: &[FieldSpec] = &[
    NONCE,
    CHAIN_ID,
    MESSAGE_IDENTIFIER,
    PAYMENT_IDENTIFIER,
    EXPIRATION,
    TOKEN_NETWORK_ADDRESS,
    TOKEN,
    CHANNEL,
    RECIPIENT,
    TARGET,
    INITIATOR,
    LOCKSROOT,
    SECRETHASH,
    TRANSFERRED_AMOUNT,
    LOCKED_AMOUNT,
    AMOUNT,
    FEE,
    CROSS_ID,
    PAYMENT_STRING,
    LOCKED_TRANSFER_SIGNATURE,
    SIGNATURE,
];

pub const CROSS_TRANSACTION_LAYOUT: &[FieldSpec] = &[
    MESSAGE_IDENTIFIER,
    INITIATOR_ADDRESS,
    TARGET_ADDRESS,
    TOKEN_NETWORK_IDENTIFIER,
    SEND_ETH_AMOUNT,
    SEND_BTC_AMOUNT,
    RECEIVE_BTC_ADDRESS,
    CROSS_TYPE,
    IDENTIFIER,
    SIGNATURE,
];

pub const ACCEPT_CROSS_LAYOUT: &[FieldSpec] = &[
    MESSAGE_IDENTIFIER,
    INITIATOR_ADDRESS,
    TARGET_ADDRESS,
    IDENTIFIER,
    ACCEPT,
    SIGNATURE,
];
