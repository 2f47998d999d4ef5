//! # secp256k1 Signer
//!
//! Recoverable ECDSA over `keccak256(signed_payload)`. Signatures are
//! 65 bytes `r || s || v` with `v = 27 + recovery id`, so the sender of a
//! message is the address recovered from its own trailing signature.

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use shared_types::{keccak256, Address, Signature, SIGNATURE_LEN};
use xc_01_wire_codec::Message;

use crate::domain::DispatchError;
use crate::ports::MessageSigner;

/// Node key backed by `k256`.
pub struct Secp256k1Signer {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for Secp256k1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1Signer")
            .field("address", &shared_types::address_hex(&self.address))
            .finish_non_exhaustive()
    }
}

impl Secp256k1Signer {
    /// Load a 32-byte private key.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, DispatchError> {
        let key = SigningKey::from_slice(secret)
            .map_err(|_| DispatchError::InvalidSignature("invalid secp256k1 private key".into()))?;
        Ok(Self::from_key(key))
    }

    /// Fresh key from the thread-local CSPRNG.
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut rand::thread_rng()))
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_from_pubkey(key.verifying_key());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `payload` synchronously.
    pub fn sign_payload(&self, payload: &[u8]) -> Result<Signature, DispatchError> {
        let digest = keccak256(payload);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| DispatchError::InvalidSignature(e.to_string()))?;
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + 27;
        Ok(Signature(bytes))
    }

    /// Fill in the trailing signature of `message`.
    pub fn sign_message(&self, message: &mut Message) -> Result<(), DispatchError> {
        let payload = message.signed_payload()?;
        message.set_signature(self.sign_payload(&payload)?);
        Ok(())
    }
}

#[async_trait]
impl MessageSigner for Secp256k1Signer {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, payload: &[u8]) -> Result<Signature, DispatchError> {
        self.sign_payload(payload)
    }
}

/// Address of whoever produced the trailing signature of `message`.
pub fn recover_sender(message: &Message) -> Result<Address, DispatchError> {
    let signature = message.signature();
    if signature.is_empty() {
        return Err(DispatchError::InvalidSignature(format!(
            "{} message is unsigned",
            message.kind()
        )));
    }
    let digest = keccak256(&message.signed_payload()?);
    let bytes = signature.as_bytes();

    let recovery_id = parse_recovery_id(bytes[64])?;
    let ecdsa = EcdsaSignature::from_slice(&bytes[..64])
        .map_err(|_| DispatchError::InvalidSignature("malformed r or s".into()))?;
    let key = VerifyingKey::recover_from_prehash(&digest, &ecdsa, recovery_id)
        .map_err(|_| DispatchError::InvalidSignature("public key recovery failed".into()))?;
    Ok(address_from_pubkey(&key))
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, DispatchError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => {
            return Err(DispatchError::InvalidSignature(format!(
                "invalid recovery id {}",
                v
            )))
        }
    };
    RecoveryId::try_from(id)
        .map_err(|_| DispatchError::InvalidSignature(format!("invalid recovery id {}", v)))
}

/// Last 20 bytes of the keccak of the uncompressed public key.
fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}
