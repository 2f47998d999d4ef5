//! # Domain Layer
//!
//! The state manager that owns the current application state.

pub mod errors;
pub mod state_manager;

pub use errors::WalError;
pub use state_manager::StateManager;
