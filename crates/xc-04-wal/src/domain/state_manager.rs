//! In-memory owner of the application state.

use crate::ports::StateMachine;

/// Holds the current state and folds changes into it.
pub struct StateManager<M: StateMachine> {
    machine: M,
    current_state: Option<M::State>,
}

impl<M: StateMachine> StateManager<M> {
    pub fn new(machine: M, current_state: Option<M::State>) -> Self {
        Self {
            machine,
            current_state,
        }
    }

    /// Apply one change and return the events it produced.
    pub fn dispatch(&mut self, change: &M::Change) -> Vec<M::Event> {
        let transition = self.machine.transition(self.current_state.take(), change);
        self.current_state = Some(transition.new_state);
        transition.events
    }

    pub fn current_state(&self) -> Option<&M::State> {
        self.current_state.as_ref()
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }
}
