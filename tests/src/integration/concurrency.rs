//! # Concurrent Swap-Row Updates
//!
//! Status and state-change-id are written by different tasks. Each column
//! update is a read-modify-write under the storage write lock, so racing
//! writers never erase each other's column. Full-row writes go through the
//! version guard instead.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use shared_types::{Signature, U256};
    use xc_01_wire_codec::{CrossTransaction, CrossType};
    use xc_02_cross_swap::{CrossTransactionRecord, SwapStatus};
    use xc_03_storage::{InMemoryKVStore, Storage, StorageError};

    use crate::harness::TOKEN_NETWORK;

    const ROWS: u64 = 16;

    fn record(identifier: u64) -> CrossTransactionRecord {
        CrossTransactionRecord::from_request(&CrossTransaction {
            message_identifier: identifier,
            initiator_address: [0xaa; 20],
            target_address: [0xbb; 20],
            token_network_identifier: TOKEN_NETWORK,
            send_eth_amount: U256::from(10),
            send_btc_amount: U256::from(40_000),
            receive_btc_address: "tb1qexample".into(),
            cross_type: CrossType::Remote,
            identifier: U256::from(identifier),
            signature: Signature::EMPTY,
        })
    }

    fn storage_with_rows() -> Arc<Storage<InMemoryKVStore>> {
        let storage = Arc::new(Storage::open(InMemoryKVStore::new()).unwrap());
        for id in 1..=ROWS {
            storage.create_crosstransaction(&record(id)).unwrap();
        }
        storage
    }

    #[test]
    fn test_concurrent_column_updates_keep_both_columns() {
        for _ in 0..20 {
            let storage = storage_with_rows();
            let barrier = Arc::new(Barrier::new(2));

            let status_writer = {
                let (storage, barrier) = (Arc::clone(&storage), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    for id in 1..=ROWS {
                        storage
                            .change_crosstransaction_status(U256::from(id), SwapStatus::AcceptSent)
                            .unwrap();
                    }
                })
            };
            let id_writer = {
                let (storage, barrier) = (Arc::clone(&storage), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    for id in (1..=ROWS).rev() {
                        storage
                            .change_crosstransaction_statechangeid(U256::from(id), 100 + id)
                            .unwrap();
                    }
                })
            };
            status_writer.join().unwrap();
            id_writer.join().unwrap();

            for id in 1..=ROWS {
                let row = storage
                    .get_crosstransaction_by_identifier(U256::from(id))
                    .unwrap();
                assert_eq!(row.status, SwapStatus::AcceptSent);
                assert_eq!(row.state_change_id, Some(100 + id));
                assert_eq!(row.version, 2);
            }
        }
    }

    #[test]
    fn test_blind_overwrite_loses_a_column() {
        let storage = storage_with_rows();
        let id = U256::from(1);

        // Writer 1 reads the row, writer 2 then updates the status.
        let mut stale = storage.get_crosstransaction_by_identifier(id).unwrap();
        storage
            .change_crosstransaction_status(id, SwapStatus::AcceptSent)
            .unwrap();

        // Writer 1 refreshes only the version before writing its copy back.
        stale.state_change_id = Some(7);
        stale.version = storage.get_crosstransaction_by_identifier(id).unwrap().version;
        storage.replace_crosstransaction(&stale).unwrap();

        let row = storage.get_crosstransaction_by_identifier(id).unwrap();
        assert_eq!(row.state_change_id, Some(7));
        assert_eq!(row.status, SwapStatus::Created);
    }

    #[test]
    fn test_stale_full_row_write_is_rejected() {
        let storage = storage_with_rows();
        let id = U256::from(2);

        let mut stale = storage.get_crosstransaction_by_identifier(id).unwrap();
        storage
            .change_crosstransaction_status(id, SwapStatus::AcceptSent)
            .unwrap();

        stale.state_change_id = Some(7);
        let err = storage.replace_crosstransaction(&stale).unwrap_err();
        assert!(matches!(
            err,
            StorageError::StaleWrite { expected: 0, found: 1, .. }
        ));

        let row = storage.get_crosstransaction_by_identifier(id).unwrap();
        assert_eq!(row.status, SwapStatus::AcceptSent);
        assert_eq!(row.state_change_id, None);
    }

    #[test]
    fn test_racing_full_row_writers_one_wins() {
        let storage = storage_with_rows();
        let id = U256::from(3);
        let snapshot = storage.get_crosstransaction_by_identifier(id).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let writers: Vec<_> = [SwapStatus::AcceptSent, SwapStatus::Accepted]
            .into_iter()
            .map(|status| {
                let (storage, barrier) = (Arc::clone(&storage), Arc::clone(&barrier));
                let mut row = snapshot.clone();
                thread::spawn(move || {
                    row.status = status;
                    barrier.wait();
                    storage.replace_crosstransaction(&row).is_ok()
                })
            })
            .collect();
        let wins = writers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(
            storage.get_crosstransaction_by_identifier(id).unwrap().version,
            snapshot.version + 1
        );
    }
}
