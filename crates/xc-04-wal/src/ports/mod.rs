//! # Ports Module
//!
//! The pluggable transition function driven by the log.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Result of applying one state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, E> {
    pub new_state: S,
    pub events: Vec<E>,
}

impl<S, E> Transition<S, E> {
    pub fn new(new_state: S, events: Vec<E>) -> Self {
        Self { new_state, events }
    }

    /// A transition that produced no events.
    pub fn quiet(new_state: S) -> Self {
        Self::new(new_state, Vec::new())
    }
}

/// A deterministic state-transition function.
///
/// Replay relies on `transition` being pure: the same state and change must
/// always yield the same new state and events.
pub trait StateMachine: Send + Sync {
    type State: Serialize + DeserializeOwned + Send + Sync;
    type Change: Serialize + DeserializeOwned + Send + Sync;
    type Event: Serialize + DeserializeOwned + Send + Sync;

    /// Apply `change`; `state` is `None` before the first change.
    fn transition(
        &self,
        state: Option<Self::State>,
        change: &Self::Change,
    ) -> Transition<Self::State, Self::Event>;
}
