//! # Domain Errors
//!
//! Error types for the cross-chain swap state machine.

use thiserror::Error;

/// Cross-chain swap error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// Invalid swap state transition.
    #[error("Invalid swap transition: {from} -> {to}")]
    InvalidSwapTransition {
        /// Current status
        from: String,
        /// Attempted status
        to: String,
    },

    /// Stored status code outside the known set.
    #[error("Unknown swap status code: {0}")]
    UnknownStatus(u8),

    /// Secret does not hash to the recorded hashlock.
    #[error("Secret does not match hash_r")]
    SecretMismatch,

    /// External swap-leg or payment collaborator failed.
    #[error("Swap collaborator error: {0}")]
    Collaborator(String),
}
