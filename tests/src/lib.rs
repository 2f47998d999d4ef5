//! # Cross-Channel Test Suite
//!
//! Unified test crate for behaviour that spans subsystems.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── harness.rs        # In-process nodes joined by channel transports
//! │   └── integration/
//! │       ├── swap_flows.rs # Two-node swap negotiation and settlement
//! │       ├── recovery.rs   # Crash replay and state-change ranges
//! │       └── concurrency.rs# Concurrent swap-row mutation
//! └── benches/
//!     └── codec_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p xc-tests
//! cargo test -p xc-tests integration::swap_flows::
//! cargo bench -p xc-tests
//! ```

pub mod harness;
pub mod integration;
