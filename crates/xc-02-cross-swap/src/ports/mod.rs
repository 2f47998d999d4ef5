//! # Ports Module
//!
//! Hexagonal architecture ports for cross-chain swaps.

pub mod outbound;

pub use outbound::*;
