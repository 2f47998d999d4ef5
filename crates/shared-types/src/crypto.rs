//! Keccak helpers for hashlocks and signed payloads.

use crate::entities::{Hash, Secret, SecretHash};
use rand::RngCore;
use sha3::{Digest, Keccak256};

/// Keccak256 digest of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashlock for a secret.
pub fn secrethash(secret: &Secret) -> SecretHash {
    keccak256(secret)
}

/// Fresh random secret from the thread-local CSPRNG.
pub fn random_secret() -> Secret {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}
