//! # Domain Layer
//!
//! State, state changes and events of the transfer state machine.

pub mod events;
pub mod state;
pub mod state_changes;

pub use events::Event;
pub use state::*;
pub use state_changes::*;
