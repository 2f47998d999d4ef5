//! # XC-02 Cross-Chain Swap
//!
//! Bookkeeping for swaps negotiated on top of the payment channels.
//!
//! **Subsystem ID:** 2  
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Swap Lifecycle
//!
//! | Code | Status | Entered by |
//! |------|--------|------------|
//! | 1 | Created | receiving or originating a swap-initiate |
//! | 2 | AcceptSent | responder after sending its accept |
//! | 3 | Accepted | initiator on receiving the accept |
//! | 4 | Locked | target of the swap's locked transfer |
//! | 5 | SecretRequestPending | secret request arrived before the secret |
//! | 6 | SecretReady | off-chain leg delivered the secret |
//! | 8 | Synced | sync-ack sent or received |
//!
//! Accept code 7 (sync-ack) only travels on the wire.
//!
//! ## Module Structure
//!
//! ```text
//! xc-02-cross-swap/
//! ├── domain/          # SwapStatus, CrossTransactionRecord, errors
//! └── ports/           # SwapLeg, PaymentRequester
//! ```

#![warn(clippy::all)]

pub mod domain;
pub mod ports;

// Re-exports
pub use domain::{CrossTransactionRecord, SwapError, SwapStatus};
pub use ports::{MockSwapLeg, PaymentRequester, SwapLeg, SwapLegCall};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
