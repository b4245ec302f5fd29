//! Round wallet identities
//!
//! Each round receives deposits at a freshly generated ed25519 key. The
//! base58 form of the public key is the address subscribers send funds to.

use super::errors::LedgerError;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base58 encoded 32-byte ledger address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Build an address from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// Parse and validate a base58 address.
    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        Self::decode(value)?;
        Ok(Self(value.to_string()))
    }

    /// Decode into raw bytes.
    pub fn to_bytes(&self) -> Result<[u8; 32], LedgerError> {
        Self::decode(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn decode(value: &str) -> Result<[u8; 32], LedgerError> {
        let raw = bs58::decode(value)
            .into_vec()
            .map_err(|e| LedgerError::InvalidAddress(format!("{value}: {e}")))?;
        raw.try_into().map_err(|raw: Vec<u8>| {
            LedgerError::InvalidAddress(format!("{value}: expected 32 bytes, got {}", raw.len()))
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Address {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Signing credential of a round's receiving address.
pub struct RoundKeypair {
    signing_key: SigningKey,
}

impl RoundKeypair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Create from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_bytes(&self.public_key())
    }

    /// Sign a serialized ledger message.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for RoundKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
