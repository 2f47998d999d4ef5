//! # Adapters Layer
//!
//! Concrete signer and an in-process transport.

pub mod channel;
pub mod signer;

pub use channel::{ChannelTransport, Envelope};
pub use signer::{recover_sender, Secp256k1Signer};
