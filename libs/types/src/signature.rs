//! ECDSA signatures and the wallet helper
//!
//! Orders and trades are signed with secp256k1 over the personal-message
//! envelope of the content hash, so signatures produced by standard
//! Ethereum wallets verify here unchanged. Verification recovers the
//! signer address from `{r, s, v}` and compares it to the claimed maker
//! or taker.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::{keccak256, Address, Hash};

/// Prefix applied to a 32-byte hash before signing.
const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Errors produced while creating or verifying signatures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature encoding: {0}")]
    InvalidEncoding(String),
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(String),
    #[error("signer mismatch: recovered {recovered}, expected {expected}")]
    SignerMismatch { recovered: Address, expected: Address },
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
}

/// Envelope hash actually signed: keccak-256 of the prefixed content hash.
pub fn personal_message_hash(hash: &Hash) -> Hash {
    keccak256(&[PERSONAL_MESSAGE_PREFIX, hash.as_bytes()])
}

/// A recoverable secp256k1 signature in Ethereum's `{r, s, v}` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: Hash,
    pub s: Hash,
    pub v: u8,
}

impl Signature {
    /// Sign a content hash with the given key.
    pub fn sign(hash: &Hash, key: &SigningKey) -> Result<Self, SignatureError> {
        let message = personal_message_hash(hash);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(message.as_bytes())
            .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(Self {
            r: Hash::from_bytes(r),
            s: Hash::from_bytes(s),
            v: recovery_id.to_byte() + 27,
        })
    }

    /// Recover the signer address for the given content hash.
    pub fn recover(&self, hash: &Hash) -> Result<Address, SignatureError> {
        let message = personal_message_hash(hash);

        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(self.r.as_bytes());
        raw[32..].copy_from_slice(self.s.as_bytes());
        let signature = EcdsaSignature::from_slice(&raw)
            .map_err(|e| SignatureError::InvalidEncoding(e.to_string()))?;

        let recovery_id = self
            .v
            .checked_sub(27)
            .and_then(RecoveryId::from_byte)
            .ok_or(SignatureError::InvalidRecoveryId(self.v))?;

        let verifying_key =
            VerifyingKey::recover_from_prehash(message.as_bytes(), &signature, recovery_id)
                .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

        Ok(address_from_verifying_key(&verifying_key))
    }

    /// Verify that this signature over `hash` was produced by `signer`.
    pub fn verify(&self, hash: &Hash, signer: &Address) -> Result<(), SignatureError> {
        let recovered = self.recover(hash)?;
        if recovered == *signer {
            Ok(())
        } else {
            Err(SignatureError::SignerMismatch {
                recovered,
                expected: *signer,
            })
        }
    }
}

/// Derive an address from an uncompressed public key: the low 20 bytes of
/// the keccak-256 digest of the 64-byte curve point.
fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&[&point.as_bytes()[1..]]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

/// An in-process signing identity: address plus secp256k1 key.
///
/// Services use wallets for test clients and fixtures; production order
/// flow only ever sees the signatures.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub address: Address,
    signing_key: SigningKey,
}

impl Wallet {
    /// Generate a wallet with a random key.
    pub fn random() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self {
            address,
            signing_key,
        }
    }

    /// Build a wallet from a hex-encoded secret key.
    pub fn from_secret_hex(secret: &str) -> Result<Self, SignatureError> {
        let stripped = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes =
            hex::decode(stripped).map_err(|e| SignatureError::InvalidSecretKey(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| SignatureError::InvalidSecretKey(e.to_string()))?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            address,
            signing_key,
        })
    }

    /// Sign a content hash, producing an `{r, s, v}` signature.
    pub fn sign_hash(&self, hash: &Hash) -> Result<Signature, SignatureError> {
        Signature::sign(hash, &self.signing_key)
    }
}
