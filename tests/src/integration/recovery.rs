//! # Crash Recovery
//!
//! A state change that reached storage but was never applied must be
//! applied by replay, giving the same state as an uninterrupted run.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared_types::{Address, U256};
    use xc_03_storage::{FileBackedKVStore, InMemoryKVStore, KeyValueStore, RangeBound, Storage};
    use xc_04_wal::WriteAheadLog;
    use xc_05_transfer::{
        get_best_routes, ChannelEndState, ChannelState, ChannelStatus, Event, StateChange,
        TransferStateMachine,
    };

    use crate::harness::{chain_id, TOKEN, TOKEN_NETWORK};

    const US: Address = [0xaa; 20];
    const PARTNER: Address = [0xbb; 20];
    const CHANNEL: Address = [0xc1; 20];

    fn channel() -> ChannelState {
        ChannelState {
            identifier: CHANNEL,
            chain_id: chain_id(),
            token_network_identifier: TOKEN_NETWORK,
            token: TOKEN,
            our_state: ChannelEndState::new(US, U256::from(100)),
            partner_state: ChannelEndState::new(PARTNER, U256::from(100)),
            status: ChannelStatus::Opened,
        }
    }

    fn history() -> Vec<StateChange> {
        let mut changes = vec![
            StateChange::ActionNewChannel { channel: channel() },
            StateChange::Block { block_number: 5 },
        ];
        let mut state = TransferStateMachine::new(US, chain_id()).initial_state();
        xc_05_transfer::state_transition(&mut state, &changes[0]);
        let routes = get_best_routes(&state, &TOKEN_NETWORK, &US, &PARTNER, U256::from(10), None);
        changes.push(StateChange::ActionInitInitiator {
            token_network_identifier: TOKEN_NETWORK,
            payment_identifier: 1,
            amount: U256::from(10),
            target: PARTNER,
            secret: [3u8; 32],
            expiration: U256::from(100),
            routes,
        });
        changes.push(StateChange::Block { block_number: 6 });
        changes
    }

    type Wal<KV> = WriteAheadLog<TransferStateMachine, KV>;

    fn open<KV: KeyValueStore>(storage: Arc<Storage<KV>>) -> (Wal<KV>, Vec<Event>) {
        WriteAheadLog::restore(TransferStateMachine::new(US, chain_id()), storage).unwrap()
    }

    #[test]
    fn test_crash_after_persist_replays_to_same_state() {
        let changes = history();

        // Uninterrupted run.
        let (mut reference, _) = open(Arc::new(Storage::open(InMemoryKVStore::new()).unwrap()));
        for change in &changes {
            reference.log_and_dispatch(change, 6).unwrap();
        }

        // Same run, crashing after the last change hit storage.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.db");
        {
            let storage = Arc::new(Storage::open(FileBackedKVStore::open(&path).unwrap()).unwrap());
            let (mut wal, _) = open(Arc::clone(&storage));
            let (last, applied) = changes.split_last().unwrap();
            for change in applied {
                wal.log_and_dispatch(change, 6).unwrap();
            }
            storage.write_state_change(last).unwrap();
        }

        let storage = Arc::new(Storage::open(FileBackedKVStore::open(&path).unwrap()).unwrap());
        let (recovered, replayed) = open(storage);
        assert_eq!(recovered.state_change_id(), Some(changes.len() as u64));
        assert_eq!(recovered.current_state(), reference.current_state());
        assert!(replayed
            .iter()
            .any(|e| matches!(e, Event::SendLockedTransfer { recipient, .. } if *recipient == PARTNER)));
    }

    #[test]
    fn test_replay_resumes_after_snapshot() {
        let changes = history();
        let storage = Arc::new(Storage::open(InMemoryKVStore::new()).unwrap());
        {
            let (mut wal, _) = open(Arc::clone(&storage));
            wal.log_and_dispatch(&changes[0], 0).unwrap();
            wal.log_and_dispatch(&changes[1], 5).unwrap();
            assert!(wal.snapshot().unwrap());
            wal.log_and_dispatch(&changes[2], 5).unwrap();
        }

        let (wal, replayed) = open(Arc::clone(&storage));
        assert_eq!(wal.state_change_id(), Some(3));
        // Only the change after the snapshot anchor is replayed.
        assert!(replayed
            .iter()
            .all(|e| matches!(e, Event::SendLockedTransfer { .. })));
        assert_eq!(replayed.len(), 1);
    }

    #[test]
    fn test_state_change_ranges() {
        let changes = history();
        let storage = Arc::new(Storage::open(InMemoryKVStore::new()).unwrap());
        let (mut wal, _) = open(Arc::clone(&storage));
        for change in &changes {
            wal.log_and_dispatch(change, 0).unwrap();
        }

        let all: Vec<(u64, StateChange)> = storage
            .get_statechanges_by_identifier(RangeBound::Id(0), RangeBound::Latest)
            .unwrap();
        assert_eq!(all.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(
            all.into_iter().map(|(_, c)| c).collect::<Vec<_>>(),
            changes
        );

        let single: Vec<(u64, StateChange)> = storage
            .get_statechanges_by_identifier(RangeBound::Id(2), RangeBound::Id(2))
            .unwrap();
        assert_eq!(single, vec![(2, changes[1].clone())]);
    }
}
