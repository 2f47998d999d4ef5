//! # Node Runtime Library
//!
//! Configuration, recovery and wiring for a cross-channel node. The
//! `node-runtime` binary is a thin shell around [`NodeRuntime`].
//!
//! ## Modules
//!
//! - `config` - [`NodeConfig`] from `XC_*` environment variables
//! - `runtime` - startup recovery, dispatch tasks, shutdown snapshot
//! - `adapters` - stand-in swap legs
//! - `console` - operator input (blocks, secrets, raw messages)

#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod console;
pub mod runtime;

pub use adapters::DetachedSwapLeg;
pub use config::{ConfigError, NodeConfig, StorageBackend};
pub use console::{parse_line, read_lines, ConsoleError};
pub use runtime::{Inbound, NodeRuntime, RuntimeError};
