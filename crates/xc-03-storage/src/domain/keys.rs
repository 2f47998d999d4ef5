//! # Key Layout
//!
//! Every table is a key prefix. Integer ids are big-endian so the backend's
//! lexicographic order is numeric order.

use shared_types::{u256_to_bytes, SecretHash, U256};

pub const SETTINGS_VERSION: &[u8] = b"settings/version";
pub const LAST_STATE_CHANGE_ID: &[u8] = b"meta/last_state_change_id";
pub const LAST_EVENT_ID: &[u8] = b"meta/last_event_id";
pub const LAST_PARKED_ID: &[u8] = b"meta/last_parked_id";
pub const SNAPSHOT: &[u8] = b"state_snapshot/1";
pub const PAYMENT_NODE: &[u8] = b"payment_node/credentials";

pub const STATE_CHANGE_PREFIX: &[u8] = b"state_changes/";
pub const EVENT_PREFIX: &[u8] = b"state_events/";
pub const PARKED_PREFIX: &[u8] = b"parked_state_changes/";
pub const CROSS_PREFIX: &[u8] = b"crosstransaction/";
pub const CROSS_BY_R_PREFIX: &[u8] = b"crosstransaction_by_r/";

pub fn id_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn id_from_key(prefix: &[u8], key: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = key.strip_prefix(prefix)?.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

pub fn cross_key(identifier: U256) -> Vec<u8> {
    [CROSS_PREFIX, &u256_to_bytes(identifier)].concat()
}

pub fn cross_by_r_key(hash_r: &SecretHash) -> Vec<u8> {
    [CROSS_BY_R_PREFIX, hash_r.as_slice()].concat()
}
