//! # Write-Ahead Log Service
//!
//! Every state change is written to storage before it touches the in-memory
//! state, so a crash at any point can be recovered by replay.

use std::sync::Arc;

use tracing::{debug, info, warn};
use xc_03_storage::{
    BincodeSerializer, KeyValueStore, RangeBound, StateSerializer, Storage,
};

use crate::domain::{StateManager, WalError};
use crate::ports::StateMachine;

/// Persist-then-apply log over a [`StateMachine`].
pub struct WriteAheadLog<M, KV, S = BincodeSerializer>
where
    M: StateMachine,
    KV: KeyValueStore,
    S: StateSerializer,
{
    state_manager: StateManager<M>,
    storage: Arc<Storage<KV, S>>,
    state_change_id: Option<u64>,
    snapshot_interval: Option<u64>,
    changes_since_snapshot: u64,
}

impl<M, KV, S> WriteAheadLog<M, KV, S>
where
    M: StateMachine,
    KV: KeyValueStore,
    S: StateSerializer,
{
    /// Rebuild the log from the latest snapshot plus every later change.
    ///
    /// Returns the events produced during replay; re-emitting any of them is
    /// the caller's decision.
    pub fn restore(
        machine: M,
        storage: Arc<Storage<KV, S>>,
    ) -> Result<(Self, Vec<M::Event>), WalError> {
        let last_logged = storage.last_state_change_id()?;
        let (anchor, state) = match storage.get_state_snapshot::<M::State>()? {
            Some(snapshot) => (Some(snapshot.state_change_id), Some(snapshot.state)),
            None => (None, None),
        };
        if let Some(anchor) = anchor {
            if last_logged.map_or(true, |last| anchor > last) {
                return Err(WalError::SnapshotAhead {
                    anchor,
                    last: last_logged,
                });
            }
        }

        let from = anchor.map_or(0, |id| id + 1);
        let unapplied = storage
            .get_statechanges_by_identifier::<M::Change>(RangeBound::Id(from), RangeBound::Latest)?;

        let mut state_manager = StateManager::new(machine, state);
        let mut events = Vec::new();
        let mut state_change_id = anchor;
        for (id, change) in &unapplied {
            events.extend(state_manager.dispatch(change));
            state_change_id = Some(*id);
        }

        info!(
            snapshot_anchor = ?anchor,
            replayed = unapplied.len(),
            events = events.len(),
            "Write-ahead log restored"
        );

        let wal = Self {
            state_manager,
            storage,
            state_change_id,
            snapshot_interval: None,
            changes_since_snapshot: unapplied.len() as u64,
        };
        Ok((wal, events))
    }

    /// Snapshot automatically after every `interval` logged changes.
    pub fn with_snapshot_interval(mut self, interval: u64) -> Self {
        self.snapshot_interval = (interval > 0).then_some(interval);
        self
    }

    /// Log `change`, apply it, then persist the events it produced.
    pub fn log_and_dispatch(
        &mut self,
        change: &M::Change,
        block_number: u64,
    ) -> Result<Vec<M::Event>, WalError> {
        let state_change_id = self.storage.write_state_change(change)?;

        let events = self.state_manager.dispatch(change);

        self.state_change_id = Some(state_change_id);
        self.storage
            .write_events(state_change_id, block_number, &events)?;
        debug!(
            state_change_id,
            block_number,
            events = events.len(),
            "State change dispatched"
        );

        self.changes_since_snapshot += 1;
        if let Some(interval) = self.snapshot_interval {
            if self.changes_since_snapshot >= interval {
                if let Err(e) = self.snapshot() {
                    warn!(error = %e, "Periodic snapshot failed");
                }
            }
        }
        Ok(events)
    }

    /// Persist the current state under the last dispatched change id.
    ///
    /// Returns `false` when nothing has been dispatched yet.
    pub fn snapshot(&mut self) -> Result<bool, WalError> {
        let (Some(state_change_id), Some(state)) =
            (self.state_change_id, self.state_manager.current_state())
        else {
            return Ok(false);
        };
        self.storage.write_state_snapshot(state_change_id, state)?;
        self.changes_since_snapshot = 0;
        Ok(true)
    }

    pub fn current_state(&self) -> Option<&M::State> {
        self.state_manager.current_state()
    }

    pub fn state_change_id(&self) -> Option<u64> {
        self.state_change_id
    }

    pub fn storage(&self) -> &Arc<Storage<KV, S>> {
        &self.storage
    }

    pub fn machine(&self) -> &M {
        self.state_manager.machine()
    }

    /// Schema version of the backing storage.
    pub fn version(&self) -> Result<u32, WalError> {
        Ok(self.storage.get_version()?)
    }
}
