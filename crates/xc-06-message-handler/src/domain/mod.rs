//! # Domain Layer
//!
//! Dispatch errors and the outbound queue naming rule.

pub mod errors;

pub use errors::DispatchError;

use shared_types::address_hex;
use xc_01_wire_codec::Message;

/// Queue for messages that are not bound to a channel.
pub const GLOBAL_QUEUE: &str = "global";

/// Transport queue for an outbound message.
///
/// Balance-proof messages are ordered per channel; everything else shares
/// the global queue.
pub fn queue_name(message: &Message) -> String {
    let channel = match message {
        Message::Secret(m) => Some(m.channel),
        Message::DirectTransfer(m) => Some(m.channel),
        Message::LockedTransfer(m) | Message::RefundTransfer(m) => Some(m.channel),
        Message::CrossLockedTransfer(m) => Some(m.transfer.channel),
        _ => None,
    };
    channel.map_or_else(|| GLOBAL_QUEUE.to_string(), |c| address_hex(&c))
}
