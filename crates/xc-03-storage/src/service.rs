//! # Storage Service
//!
//! Durable tables for the write-ahead log and the swap rows.
//!
//! ## Concurrency
//!
//! All mutations take the single write guard on the backend for their whole
//! read-modify-write, which makes id allocation gap-free and swap-row column
//! updates linearizable. Reads share the read guard.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{BlockNumber, Secret, SecretHash, U256};
use tracing::{debug, error, info};
use xc_02_cross_swap::{CrossTransactionRecord, SwapStatus};

use crate::adapters::BincodeSerializer;
use crate::domain::keys::*;
use crate::domain::{
    resolve_range, PaymentNodeCredentials, RangeBound, SnapshotRecord, StorageError, StoredEvent,
    DB_VERSION,
};
use crate::ports::{BatchOperation, KeyValueStore, StateSerializer};

/// The storage service, generic over its backend and serializer.
pub struct Storage<KV: KeyValueStore, S: StateSerializer = BincodeSerializer> {
    kv: RwLock<KV>,
    serializer: S,
}

impl<KV: KeyValueStore> Storage<KV, BincodeSerializer> {
    /// Open with the default bincode serializer.
    pub fn open(kv: KV) -> Result<Self, StorageError> {
        Self::with_serializer(kv, BincodeSerializer)
    }
}

impl<KV: KeyValueStore, S: StateSerializer> Storage<KV, S> {
    /// Open the store, recording the schema version on first use.
    ///
    /// Fails with `CorruptStorage` if the recorded version is unreadable or
    /// newer than this build understands.
    pub fn with_serializer(kv: KV, serializer: S) -> Result<Self, StorageError> {
        let storage = Self {
            kv: RwLock::new(kv),
            serializer,
        };
        storage.run_updates()?;
        Ok(storage)
    }

    fn run_updates(&self) -> Result<(), StorageError> {
        let mut kv = self.kv.write();
        match kv.get(SETTINGS_VERSION)? {
            None => {
                kv.put(SETTINGS_VERSION, &DB_VERSION.to_be_bytes())?;
                info!(version = DB_VERSION, "Initialized storage schema");
            }
            Some(raw) => {
                let version = decode_version(&raw)?;
                if version > DB_VERSION {
                    error!(version, supported = DB_VERSION, "Storage schema is newer than this node");
                    return Err(StorageError::CorruptStorage(format!(
                        "schema version {} is newer than supported {}",
                        version, DB_VERSION
                    )));
                }
                debug!(version, "Opened storage");
            }
        }
        Ok(())
    }

    /// Schema version recorded in `settings`.
    pub fn get_version(&self) -> Result<u32, StorageError> {
        let raw = self
            .kv
            .read()
            .get(SETTINGS_VERSION)?
            .ok_or_else(|| StorageError::CorruptStorage("settings table has no version".into()))?;
        decode_version(&raw)
    }

    // =========================================================================
    // STATE CHANGES
    // =========================================================================

    /// Append a state change; returns its id (1, 2, 3, ...).
    pub fn write_state_change<T: Serialize>(&self, change: &T) -> Result<u64, StorageError> {
        let data = self.encode(change)?;
        let mut kv = self.kv.write();
        let id = read_counter(&*kv, LAST_STATE_CHANGE_ID)? + 1;
        kv.atomic_batch_write(vec![
            BatchOperation::put(id_key(STATE_CHANGE_PREFIX, id), data),
            BatchOperation::put(LAST_STATE_CHANGE_ID, id.to_be_bytes().to_vec()),
        ])?;
        debug!(state_change_id = id, "State change written");
        Ok(id)
    }

    /// Highest state-change id written so far.
    pub fn last_state_change_id(&self) -> Result<Option<u64>, StorageError> {
        let last = read_counter(&*self.kv.read(), LAST_STATE_CHANGE_ID)?;
        Ok((last > 0).then_some(last))
    }

    pub fn get_state_change_by_identifier<T: DeserializeOwned>(
        &self,
        id: u64,
    ) -> Result<T, StorageError> {
        let raw = self
            .kv
            .read()
            .get(&id_key(STATE_CHANGE_PREFIX, id))?
            .ok_or_else(|| StorageError::NotFound(format!("state change {}", id)))?;
        self.decode(&raw)
    }

    /// Inclusive range of state changes, ascending by id.
    pub fn get_statechanges_by_identifier<T: DeserializeOwned>(
        &self,
        from: RangeBound,
        to: RangeBound,
    ) -> Result<Vec<(u64, T)>, StorageError> {
        let kv = self.kv.read();
        let last = read_counter(&*kv, LAST_STATE_CHANGE_ID)?;
        let Some((low, high)) = resolve_range(from, to, (last > 0).then_some(last))? else {
            return Ok(Vec::new());
        };
        kv.prefix_scan(STATE_CHANGE_PREFIX)?
            .into_iter()
            .filter_map(|(key, value)| {
                let id = id_from_key(STATE_CHANGE_PREFIX, &key)?;
                (low..=high).contains(&id).then_some((id, value))
            })
            .map(|(id, value)| self.decode(&value).map(|change| (id, change)))
            .collect()
    }

    // =========================================================================
    // SNAPSHOT
    // =========================================================================

    /// Replace the single snapshot row.
    pub fn write_state_snapshot<T: Serialize>(
        &self,
        state_change_id: u64,
        state: &T,
    ) -> Result<(), StorageError> {
        let data = self.encode(&SnapshotRecord {
            state_change_id,
            state,
        })?;
        self.kv.write().put(SNAPSHOT, &data)?;
        info!(state_change_id, bytes = data.len(), "Snapshot written");
        Ok(())
    }

    pub fn get_state_snapshot<T: DeserializeOwned>(
        &self,
    ) -> Result<Option<SnapshotRecord<T>>, StorageError> {
        match self.kv.read().get(SNAPSHOT)? {
            Some(raw) => Ok(Some(self.decode(&raw)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Persist the events produced by one state change in a single batch.
    pub fn write_events<E: Serialize>(
        &self,
        state_change_id: u64,
        block_number: BlockNumber,
        events: &[E],
    ) -> Result<(), StorageError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut kv = self.kv.write();
        let mut event_id = read_counter(&*kv, LAST_EVENT_ID)?;
        let mut batch = Vec::with_capacity(events.len() + 1);
        for event in events {
            event_id += 1;
            let row = StoredEvent {
                event_id,
                source_statechange_id: state_change_id,
                block_number,
                event,
            };
            batch.push(BatchOperation::put(
                id_key(EVENT_PREFIX, event_id),
                self.encode(&row)?,
            ));
        }
        batch.push(BatchOperation::put(
            LAST_EVENT_ID,
            event_id.to_be_bytes().to_vec(),
        ));
        kv.atomic_batch_write(batch)?;
        debug!(state_change_id, count = events.len(), "Events written");
        Ok(())
    }

    /// Inclusive range of events by event id.
    pub fn get_events_by_identifier<E: DeserializeOwned>(
        &self,
        from: RangeBound,
        to: RangeBound,
    ) -> Result<Vec<StoredEvent<E>>, StorageError> {
        let kv = self.kv.read();
        let last = read_counter(&*kv, LAST_EVENT_ID)?;
        let Some((low, high)) = resolve_range(from, to, (last > 0).then_some(last))? else {
            return Ok(Vec::new());
        };
        kv.prefix_scan(EVENT_PREFIX)?
            .into_iter()
            .filter(|(key, _)| {
                id_from_key(EVENT_PREFIX, key).is_some_and(|id| (low..=high).contains(&id))
            })
            .map(|(_, value)| self.decode(&value))
            .collect()
    }

    /// Events whose block number falls in the inclusive range; `Latest` is
    /// the highest block any event was recorded at.
    pub fn get_events_by_block<E: DeserializeOwned>(
        &self,
        from: RangeBound,
        to: RangeBound,
    ) -> Result<Vec<StoredEvent<E>>, StorageError> {
        let rows: Vec<StoredEvent<E>> = self
            .kv
            .read()
            .prefix_scan(EVENT_PREFIX)?
            .into_iter()
            .map(|(_, value)| self.decode(&value))
            .collect::<Result<_, _>>()?;
        let latest = rows.iter().map(|row| row.block_number).max();
        let Some((low, high)) = resolve_range(from, to, latest)? else {
            return Ok(Vec::new());
        };
        Ok(rows
            .into_iter()
            .filter(|row| (low..=high).contains(&row.block_number))
            .collect())
    }

    // =========================================================================
    // PARKED STATE CHANGES
    // =========================================================================

    /// Durably hold a state change that must not be applied yet. Parked
    /// changes live outside the replay log.
    pub fn park_state_change<T: Serialize>(&self, change: &T) -> Result<u64, StorageError> {
        let data = self.encode(change)?;
        let mut kv = self.kv.write();
        let id = read_counter(&*kv, LAST_PARKED_ID)? + 1;
        kv.atomic_batch_write(vec![
            BatchOperation::put(id_key(PARKED_PREFIX, id), data),
            BatchOperation::put(LAST_PARKED_ID, id.to_be_bytes().to_vec()),
        ])?;
        debug!(parked_id = id, "State change parked");
        Ok(id)
    }

    pub fn get_parked_state_change<T: DeserializeOwned>(
        &self,
        parked_id: u64,
    ) -> Result<T, StorageError> {
        let raw = self
            .kv
            .read()
            .get(&id_key(PARKED_PREFIX, parked_id))?
            .ok_or_else(|| StorageError::NotFound(format!("parked state change {}", parked_id)))?;
        self.decode(&raw)
    }

    pub fn remove_parked_state_change(&self, parked_id: u64) -> Result<(), StorageError> {
        self.kv.write().delete(&id_key(PARKED_PREFIX, parked_id))?;
        Ok(())
    }

    // =========================================================================
    // CROSS TRANSACTIONS
    // =========================================================================

    /// Insert a new swap row.
    pub fn create_crosstransaction(
        &self,
        record: &CrossTransactionRecord,
    ) -> Result<U256, StorageError> {
        let key = cross_key(record.identifier);
        let mut kv = self.kv.write();
        if kv.exists(&key)? {
            return Err(StorageError::DuplicateIdentifier {
                identifier: format!("{:#x}", record.identifier),
            });
        }
        let mut ops = vec![BatchOperation::put(key, self.encode(record)?)];
        if let Some(hash_r) = &record.hash_r {
            ops.push(BatchOperation::put(
                cross_by_r_key(hash_r),
                shared_types::u256_to_bytes(record.identifier).to_vec(),
            ));
        }
        kv.atomic_batch_write(ops)?;
        info!(
            identifier = %format!("{:#x}", record.identifier),
            status = record.status.code(),
            "Cross transaction created"
        );
        Ok(record.identifier)
    }

    pub fn get_crosstransaction_by_identifier(
        &self,
        identifier: U256,
    ) -> Result<CrossTransactionRecord, StorageError> {
        let kv = self.kv.read();
        self.read_cross(&*kv, identifier)
    }

    /// Look a swap up by the hash of its secret.
    pub fn get_crosstransaction_by_r(
        &self,
        hash_r: &SecretHash,
    ) -> Result<CrossTransactionRecord, StorageError> {
        let kv = self.kv.read();
        let raw = kv.get(&cross_by_r_key(hash_r))?.ok_or_else(|| {
            StorageError::NotFound(format!(
                "cross transaction with hash_r 0x{}",
                hex::encode(hash_r)
            ))
        })?;
        if raw.len() != 32 {
            return Err(StorageError::CorruptStorage(
                "hash_r index entry is not 32 bytes".into(),
            ));
        }
        self.read_cross(&*kv, U256::from_big_endian(&raw))
    }

    /// Every swap row, ascending by identifier.
    pub fn get_all_crosstransactions(&self) -> Result<Vec<CrossTransactionRecord>, StorageError> {
        self.kv
            .read()
            .prefix_scan(CROSS_PREFIX)?
            .into_iter()
            .map(|(_, value)| self.decode(&value))
            .collect()
    }

    /// Read-modify-write of one row under the write lock.
    ///
    /// `update` sees the current row; on `Ok` the row is written back with
    /// its version bumped. On `Err` nothing is written.
    pub fn update_crosstransaction<E, F>(
        &self,
        identifier: U256,
        update: F,
    ) -> Result<CrossTransactionRecord, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut CrossTransactionRecord) -> Result<(), E>,
    {
        let mut kv = self.kv.write();
        let mut record = self.read_cross(&*kv, identifier)?;
        let previous_hash_r = record.hash_r;
        update(&mut record)?;
        self.write_cross(&mut *kv, &mut record, previous_hash_r)?;
        Ok(record)
    }

    pub fn change_crosstransaction_status(
        &self,
        identifier: U256,
        status: SwapStatus,
    ) -> Result<CrossTransactionRecord, StorageError> {
        self.update_crosstransaction(identifier, |row| {
            row.status = status;
            Ok::<_, StorageError>(())
        })
    }

    pub fn change_crosstransaction_statechangeid(
        &self,
        identifier: U256,
        state_change_id: u64,
    ) -> Result<CrossTransactionRecord, StorageError> {
        self.update_crosstransaction(identifier, |row| {
            row.state_change_id = Some(state_change_id);
            Ok::<_, StorageError>(())
        })
    }

    pub fn change_crosstransaction_r(
        &self,
        identifier: U256,
        hash_r: SecretHash,
        r: Option<Secret>,
    ) -> Result<CrossTransactionRecord, StorageError> {
        self.update_crosstransaction(identifier, |row| {
            row.hash_r = Some(hash_r);
            row.r = r;
            Ok::<_, StorageError>(())
        })
    }

    /// Full-row write guarded by the version column.
    ///
    /// `record.version` must equal the stored version; otherwise another
    /// writer got there first and `StaleWrite` is returned.
    pub fn replace_crosstransaction(
        &self,
        record: &CrossTransactionRecord,
    ) -> Result<CrossTransactionRecord, StorageError> {
        let mut kv = self.kv.write();
        let current = self.read_cross(&*kv, record.identifier)?;
        if current.version != record.version {
            return Err(StorageError::StaleWrite {
                identifier: format!("{:#x}", record.identifier),
                expected: record.version,
                found: current.version,
            });
        }
        let mut next = record.clone();
        self.write_cross(&mut *kv, &mut next, current.hash_r)?;
        Ok(next)
    }

    fn read_cross(
        &self,
        kv: &KV,
        identifier: U256,
    ) -> Result<CrossTransactionRecord, StorageError> {
        let raw = kv.get(&cross_key(identifier))?.ok_or_else(|| {
            StorageError::NotFound(format!("cross transaction {:#x}", identifier))
        })?;
        self.decode(&raw)
    }

    fn write_cross(
        &self,
        kv: &mut KV,
        record: &mut CrossTransactionRecord,
        previous_hash_r: Option<SecretHash>,
    ) -> Result<(), StorageError> {
        record.version += 1;
        let mut ops = vec![BatchOperation::put(
            cross_key(record.identifier),
            self.encode(&*record)?,
        )];
        if record.hash_r != previous_hash_r {
            if let Some(old) = &previous_hash_r {
                ops.push(BatchOperation::delete(cross_by_r_key(old)));
            }
            if let Some(new) = &record.hash_r {
                ops.push(BatchOperation::put(
                    cross_by_r_key(new),
                    shared_types::u256_to_bytes(record.identifier).to_vec(),
                ));
            }
        }
        kv.atomic_batch_write(ops)?;
        debug!(
            identifier = %format!("{:#x}", record.identifier),
            status = record.status.code(),
            version = record.version,
            "Cross transaction updated"
        );
        Ok(())
    }

    // =========================================================================
    // PAYMENT NODE
    // =========================================================================

    pub fn store_payment_node_credentials(
        &self,
        credentials: &PaymentNodeCredentials,
    ) -> Result<(), StorageError> {
        let data = self.encode(credentials)?;
        self.kv.write().put(PAYMENT_NODE, &data)?;
        Ok(())
    }

    pub fn get_payment_node_credentials(
        &self,
    ) -> Result<Option<PaymentNodeCredentials>, StorageError> {
        match self.kv.read().get(PAYMENT_NODE)? {
            Some(raw) => Ok(Some(self.decode(&raw)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, StorageError> {
        self.serializer
            .serialize(value)
            .map_err(|e| StorageError::Serialization(e.message))
    }

    fn decode<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T, StorageError> {
        self.serializer.deserialize(raw).map_err(|e| {
            error!(error = %e, "Undecodable row");
            StorageError::CorruptStorage(e.message)
        })
    }
}

fn decode_version(raw: &[u8]) -> Result<u32, StorageError> {
    let bytes: [u8; 4] = raw
        .try_into()
        .map_err(|_| StorageError::CorruptStorage("settings version is not 4 bytes".into()))?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_counter<KV: KeyValueStore + ?Sized>(kv: &KV, key: &[u8]) -> Result<u64, StorageError> {
    match kv.get(key)? {
        None => Ok(0),
        Some(raw) => {
            let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                StorageError::CorruptStorage(format!(
                    "counter {} is not 8 bytes",
                    String::from_utf8_lossy(key)
                ))
            })?;
            Ok(u64::from_be_bytes(bytes))
        }
    }
}
