//! # Shared Types Crate
//!
//! Primitive value types shared by the wire codec, storage, the transfer
//! state machine and the message handler.
//!
//! ## Design Principles
//!
//! - **Fixed widths**: addresses, hashes and signatures are byte arrays whose
//!   sizes match the wire layout, so no conversion happens at the codec edge.
//! - **Big integers**: every 256-bit quantity is a `U256`.

pub mod crypto;
pub mod entities;

pub use crypto::*;
pub use entities::*;
