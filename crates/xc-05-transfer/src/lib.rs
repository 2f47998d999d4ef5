//! # XC-05 Transfer State Machine
//!
//! The deterministic channel state machine the node plugs into the
//! write-ahead log.
//!
//! **Subsystem ID:** 5
//! **Architecture:** Domain (state, state changes, events) + pure transition
//!
//! ## Payment Flow (initiator → target)
//!
//! ```text
//! Initiator ──LockedTransfer──→ Target
//! Initiator ←──SecretRequest─── Target
//! Initiator ───RevealSecret───→ Target
//! Initiator ←──RevealSecret──── Target
//! Initiator ──Unlock (Secret)─→ Target
//! ```
//!
//! Mediators forward the lock on the best route and pass the secret back
//! toward the payer. A payee with no route returns the lock as a refund.
//!
//! ## Determinism
//!
//! `state_transition` reads only its inputs. Outbound message identifiers
//! come from a counter inside [`ChainState`]; anything random (a fresh
//! secret for a retried payment) is chosen by the caller and recorded in
//! the state change.

#![warn(clippy::all)]

pub mod domain;
pub mod machine;
pub mod routing;
pub mod views;

pub use domain::{
    BalanceProof, ChainState, ChannelEndState, ChannelState, ChannelStatus, Event,
    LockedTransferState, PaymentStatus, PaymentTask, RouteState, StateChange, TransferRole,
};
pub use machine::{state_transition, TransferStateMachine};
pub use routing::get_best_routes;
pub use views::get_transfer_role;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
