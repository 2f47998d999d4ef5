//! # Primitive Entities
//!
//! Identifiers and amounts exchanged between peers.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

// Re-export U256 from primitive-types for use across all crates
pub use primitive_types::U256;

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// A 32-byte keccak256 digest.
pub type Hash = [u8; 32];

/// A 32-byte hashlock preimage.
pub type Secret = [u8; 32];

/// Hash of a secret, used as the hashlock of a locked transfer.
pub type SecretHash = Hash;

/// Merkle root over the pending locks of a channel end.
pub type Locksroot = Hash;

/// Block height as reported by the chain watcher.
pub type BlockNumber = u64;

/// The all-zero address.
pub const EMPTY_ADDRESS: Address = [0u8; 20];

/// The all-zero hash.
pub const EMPTY_HASH: Hash = [0u8; 32];

/// Largest value an 8-byte wire integer may carry.
pub const UINT64_MAX: u64 = u64::MAX;

/// Largest value a 32-byte wire integer may carry.
pub const UINT256_MAX: U256 = U256::MAX;

/// Byte width of a recoverable secp256k1 signature (r ‖ s ‖ v).
pub const SIGNATURE_LEN: usize = 65;

/// A 65-byte recoverable ECDSA signature.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde_as(as = "Bytes")] pub [u8; SIGNATURE_LEN]);

impl Signature {
    /// Placeholder carried by messages that have not been signed yet.
    pub const EMPTY: Signature = Signature([0u8; SIGNATURE_LEN]);

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{}..)", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; SIGNATURE_LEN]> for Signature {
    fn from(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }
}

/// Render an address as `0x`-prefixed lowercase hex, for log fields.
pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Big-endian 32-byte representation of a `U256`.
pub fn u256_to_bytes(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}
