//! # XC-01 Wire Codec
//!
//! Fixed-layout binary messages exchanged between channel peers.
//!
//! **Subsystem ID:** 1  
//! **Architecture:** Domain (layouts, message structs) + codec
//!
//! ## Wire Format
//!
//! ```text
//! [cmdid:1][pad:3][field_1]...[field_n][signature:65]
//! ```
//!
//! Integers are big-endian. Every kind has its own layout table in
//! [`domain::fields`]; offsets are the cumulative widths of the preceding
//! fields. Decoding fails unless the input is exactly the declared width.
//!
//! The codec exposes the signed payload and the trailing signature but
//! never verifies signatures itself.

#![warn(clippy::all)]

pub mod codec;
pub mod domain;

pub use codec::{decode, encode, layout, Message};
pub use domain::{
    AcceptCode, AcceptCross, CommandId, CrossLockedTransfer, CrossSecretRequest,
    CrossTransaction, CrossType, DecodeError, Delivered, DirectTransfer, Lock, LockedTransfer,
    Ping, Pong, Processed, RevealSecret, SecretRequest, Unlock,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
