//! # Ports Module
//!
//! Hexagonal architecture ports for storage.

pub mod outbound;

pub use outbound::*;
