//! # XC-06 Message Dispatcher
//!
//! Turns inbound wire messages into logged state changes and swap-row
//! updates, and turns the resulting events back into signed messages.
//!
//! **Subsystem ID:** 6
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Inbound Routing
//!
//! | Message | Handling |
//! |---------|----------|
//! | SecretRequest | `ReceiveSecretRequest` |
//! | RevealSecret | `ReceiveSecretReveal` |
//! | Secret (unlock) | `ReceiveUnlock` |
//! | DirectTransfer | `ReceiveTransferDirect` |
//! | LockedTransfer | `ActionInitTarget` or `ActionInitMediator` |
//! | RefundTransfer | `ReceiveTransferRefundCancelRoute` (initiator) or `ReceiveTransferRefund` |
//! | Processed | `ReceiveProcessed` |
//! | CrossTransaction / AcceptCross | swap row + reply |
//! | CrossLockedTransfer / CrossSecretRequest | swap row + channel state change |
//! | Ping / Pong / Delivered | dropped |
//!
//! Every handler receives the [`NodeContext`] explicitly. A handler never
//! panics on peer input: failures are logged, counted and reported as
//! `false` so the transport does not acknowledge the message.
//!
//! ## Module Structure
//!
//! ```text
//! xc-06-message-handler/
//! ├── domain/          # DispatchError, queue naming
//! ├── ports/           # MessageSigner, Transport
//! ├── adapters/        # secp256k1 signer, in-process channel transport
//! ├── context.rs       # NodeContext
//! ├── dispatcher.rs    # inbound routing, channel handlers
//! ├── swap.rs          # swap handlers and local swap signals
//! └── events.rs        # events to signed messages
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod context;
pub mod dispatcher;
pub mod domain;
pub mod events;
pub mod ports;
pub mod swap;

// Re-exports
pub use adapters::{recover_sender, ChannelTransport, Envelope, Secp256k1Signer};
pub use context::{CrossPayment, NodeContext, NodeWal, DEFAULT_COLLABORATOR_TIMEOUT};
pub use dispatcher::{on_message, receive};
pub use domain::{queue_name, DispatchError, GLOBAL_QUEUE};
pub use events::{emit_event, emit_events};
pub use ports::{MessageSigner, RecordingTransport, SentMessage, Transport};
pub use swap::{
    on_secret_ready, resolve_secret, resume_parked_swaps, send_crosstransfer, start_swap,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests;
