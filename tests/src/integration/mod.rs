//! # Integration Tests
//!
//! - `swap_flows` - swap negotiation and settlement between two nodes
//! - `recovery` - crash replay and state-change range queries
//! - `concurrency` - concurrent swap-row updates and the version guard

pub mod concurrency;
pub mod recovery;
pub mod swap_flows;
