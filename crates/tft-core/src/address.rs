//! Unlock hashes: the addresses of the TFT chain.
//!
//! An unlock hash identifies who may spend an output. It is a one-byte
//! [`UnlockType`] followed by a 32-byte hash of the unlock condition target
//! (for single-key addresses, the BLAKE3 hash of the specifier-prefixed
//! Ed25519 public key).
//!
//! The string form is lowercase hex of
//! `type || hash || checksum`, where the checksum is the first six bytes of
//! `BLAKE3(type || hash)`, giving a fixed 78-character string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::{ED25519_SPECIFIER, UNLOCK_HASH_CHECKSUM_SIZE};
use crate::crypto::PublicKey;
use crate::error::UnlockHashError;
use crate::types::Hash256;

/// Length in bytes of the binary form of an encoded unlock hash.
const ENCODED_BYTES: usize = 1 + 32 + UNLOCK_HASH_CHECKSUM_SIZE;

/// The kind of condition an unlock hash commits to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
pub enum UnlockType {
    /// Anyone can spend. Used for the nil condition.
    Nil,
    /// A single Ed25519 public key.
    PubKey,
}

impl UnlockType {
    /// Wire byte for this unlock type.
    pub fn as_byte(&self) -> u8 {
        match self {
            UnlockType::Nil => 0,
            UnlockType::PubKey => 1,
        }
    }

    /// Look up an unlock type from its wire byte.
    pub fn from_byte(b: u8) -> Result<Self, UnlockHashError> {
        match b {
            0 => Ok(UnlockType::Nil),
            1 => Ok(UnlockType::PubKey),
            other => Err(UnlockHashError::UnknownType(other)),
        }
    }
}

/// Address identifying the owner of an output.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct UnlockHash {
    unlock_type: UnlockType,
    hash: Hash256,
}

impl UnlockHash {
    /// The nil unlock hash (nil type, zero hash).
    pub const NIL: Self = Self {
        unlock_type: UnlockType::Nil,
        hash: Hash256::ZERO,
    };

    /// Create an unlock hash from its parts.
    pub fn new(unlock_type: UnlockType, hash: Hash256) -> Self {
        Self { unlock_type, hash }
    }

    /// Unlock hash of a single Ed25519 public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ED25519_SPECIFIER);
        hasher.update(&public_key.to_bytes());
        Self::new(UnlockType::PubKey, Hash256(hasher.finalize().into()))
    }

    pub fn unlock_type(&self) -> UnlockType {
        self.unlock_type
    }

    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn is_nil(&self) -> bool {
        self.unlock_type == UnlockType::Nil
    }

    fn checksum(unlock_type: u8, hash: &Hash256) -> [u8; UNLOCK_HASH_CHECKSUM_SIZE] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[unlock_type]);
        hasher.update(hash.as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; UNLOCK_HASH_CHECKSUM_SIZE];
        out.copy_from_slice(&digest.as_bytes()[..UNLOCK_HASH_CHECKSUM_SIZE]);
        out
    }

    /// Encode as the 78-character hex string form.
    pub fn encode(&self) -> String {
        let type_byte = self.unlock_type.as_byte();
        let mut bytes = Vec::with_capacity(ENCODED_BYTES);
        bytes.push(type_byte);
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes.extend_from_slice(&Self::checksum(type_byte, &self.hash));
        hex::encode(bytes)
    }

    /// Decode the hex string form, validating type and checksum.
    pub fn decode(s: &str) -> Result<Self, UnlockHashError> {
        if s.len() != ENCODED_BYTES * 2 {
            return Err(UnlockHashError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| UnlockHashError::InvalidHex(e.to_string()))?;

        let unlock_type = UnlockType::from_byte(bytes[0])?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[1..33]);
        let hash = Hash256(hash);

        if bytes[33..] != Self::checksum(bytes[0], &hash) {
            return Err(UnlockHashError::InvalidChecksum);
        }
        Ok(Self { unlock_type, hash })
    }
}

impl fmt::Display for UnlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for UnlockHash {
    type Err = UnlockHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s.trim())
    }
}

impl Serialize for UnlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for UnlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}
