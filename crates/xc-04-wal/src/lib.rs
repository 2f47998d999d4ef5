//! # XC-04 Write-Ahead Log
//!
//! Sequences "persist, then apply" for state changes.
//!
//! **Subsystem ID:** 4
//! **Architecture:** Domain (state manager) + port (transition function) + service
//!
//! ## Recovery
//!
//! ```text
//! snapshot (anchor = k) ──→ replay changes k+1 ..= latest ──→ current state
//! ```
//!
//! Replay is deterministic: killing the node after a change is durable but
//! before it was applied, then restoring, yields the same state as an
//! uninterrupted run.
//!
//! ## Concurrency
//!
//! `log_and_dispatch` takes `&mut self`; callers serialize dispatches
//! against one log (the message handler keeps it behind a mutex).

#![warn(clippy::all)]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{StateManager, WalError};
pub use ports::{StateMachine, Transition};
pub use service::WriteAheadLog;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
