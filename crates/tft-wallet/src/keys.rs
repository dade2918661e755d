//! Seed management, deterministic key derivation and the wallet key store.
//!
//! Keys are derived with BLAKE3's `derive_key` from `seed || index` and used
//! directly as Ed25519 secret keys. Every key of a wallet is recoverable from
//! the seed and the number of derived keys alone.

use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use tft_core::address::UnlockHash;
use tft_core::crypto::KeyPair;
use tracing::info;

use crate::error::WalletError;

/// BLAKE3 KDF context for child key derivation.
const KDF_CONTEXT: &str = "tft-wallet-key-derivation-v1";

/// Length of a wallet seed in bytes.
pub const SEED_LEN: usize = 32;

/// The 32-byte root secret of a wallet.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LEN],
}

impl Seed {
    /// Generate a random seed from the OS cryptographic RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; SEED_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse a seed from its 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        let decoded = hex::decode(s.trim())
            .map_err(|e| WalletError::KeyDerivation(format!("invalid seed hex: {e}")))?;
        let bytes: [u8; SEED_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            WalletError::KeyDerivation(format!("seed must be {SEED_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Self { bytes })
    }

    /// Raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Seed {}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Derive the keypair at `index` from `seed`.
pub fn derive_keypair(seed: &Seed, index: u64) -> Result<KeyPair, WalletError> {
    let mut ikm = Vec::with_capacity(SEED_LEN + 8);
    ikm.extend_from_slice(seed.as_bytes());
    ikm.extend_from_slice(&index.to_le_bytes());
    let mut derived = blake3::derive_key(KDF_CONTEXT, &ikm);
    ikm.zeroize();
    let kp = KeyPair::from_secret_bytes(derived);
    derived.zeroize();
    Ok(kp)
}

/// Address controlled by a keypair.
pub fn unlock_hash(keypair: &KeyPair) -> UnlockHash {
    keypair.unlock_hash()
}

/// In-memory map from address to the keypair that can spend from it.
///
/// Holds exactly the keys at indices `0..count` of its seed. The index 0
/// address is cached as the default refund address.
pub struct KeyStore {
    seed: Seed,
    keys: HashMap<UnlockHash, KeyPair>,
    count: u64,
    default_refund: UnlockHash,
}

impl KeyStore {
    /// Create a key store holding the first `count` keys of `seed`.
    pub fn new(seed: Seed, count: u64) -> Result<Self, WalletError> {
        let default_refund = unlock_hash(&derive_keypair(&seed, 0)?);
        let mut store = Self {
            seed,
            keys: HashMap::new(),
            count: 0,
            default_refund,
        };
        store.regenerate(count)?;
        Ok(store)
    }

    /// Drop every key and derive indices `0..count` again.
    pub fn regenerate(&mut self, count: u64) -> Result<(), WalletError> {
        if count == 0 {
            return Err(WalletError::InvalidRequest(
                "a wallet needs at least one key".into(),
            ));
        }
        let mut keys = HashMap::with_capacity(count as usize);
        for index in 0..count {
            let kp = derive_keypair(&self.seed, index)?;
            if index == 0 {
                self.default_refund = unlock_hash(&kp);
            }
            keys.insert(unlock_hash(&kp), kp);
        }
        self.keys = keys;
        self.count = count;
        Ok(())
    }

    /// Derive `by` more keys after the existing ones. Returns the new addresses.
    pub fn extend(&mut self, by: u64) -> Result<Vec<UnlockHash>, WalletError> {
        let end = self
            .count
            .checked_add(by)
            .ok_or_else(|| WalletError::KeyDerivation("key index overflow".into()))?;
        let mut added = Vec::with_capacity(by as usize);
        for index in self.count..end {
            let kp = derive_keypair(&self.seed, index)?;
            let uh = unlock_hash(&kp);
            self.keys.insert(uh, kp);
            added.push(uh);
        }
        self.count = end;
        info!(added = by, total = end, "extended key store");
        Ok(added)
    }

    /// Derive one new key and return its address.
    pub fn next_address(&mut self) -> Result<UnlockHash, WalletError> {
        let mut added = self.extend(1)?;
        added
            .pop()
            .ok_or_else(|| WalletError::InternalConsistency("no key derived".into()))
    }

    pub fn key_for(&self, address: &UnlockHash) -> Option<&KeyPair> {
        self.keys.get(address)
    }

    pub fn contains(&self, address: &UnlockHash) -> bool {
        self.keys.contains_key(address)
    }

    /// Snapshot of all owned addresses, sorted.
    pub fn addresses(&self) -> Vec<UnlockHash> {
        let mut addrs: Vec<UnlockHash> = self.keys.keys().copied().collect();
        addrs.sort();
        addrs
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of derived keys; the value to persist.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Address of the key at index 0.
    pub fn default_refund_address(&self) -> UnlockHash {
        self.default_refund
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("count", &self.count)
            .field("default_refund", &self.default_refund)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Seed {
        Seed::from_bytes([1u8; 32])
    }

    #[test]
    fn seed_debug_hides_bytes() {
        let seed = Seed::from_bytes([0xAB; 32]);
        let debug = format!("{seed:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn seed_from_hex() {
        let seed = Seed::from_hex(&"0f".repeat(32)).unwrap();
        assert_eq!(seed.as_bytes(), &[0x0f; 32]);
        assert!(Seed::from_hex("0f0f").is_err());
        assert!(Seed::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn derive_deterministic() {
        let a = derive_keypair(&seed(), 3).unwrap();
        let b = derive_keypair(&seed(), 3).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn derive_differs_per_index_and_seed() {
        let a = derive_keypair(&seed(), 0).unwrap();
        let b = derive_keypair(&seed(), 1).unwrap();
        let c = derive_keypair(&Seed::from_bytes([2u8; 32]), 0).unwrap();
        assert_ne!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn store_holds_exactly_count_keys() {
        let store = KeyStore::new(seed(), 5).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.count(), 5);
        for i in 0..5 {
            let uh = unlock_hash(&derive_keypair(&seed(), i).unwrap());
            assert!(store.contains(&uh));
        }
        let outside = unlock_hash(&derive_keypair(&seed(), 5).unwrap());
        assert!(!store.contains(&outside));
    }

    #[test]
    fn default_refund_is_index_zero() {
        let store = KeyStore::new(seed(), 3).unwrap();
        let first = unlock_hash(&derive_keypair(&seed(), 0).unwrap());
        assert_eq!(store.default_refund_address(), first);
    }

    #[test]
    fn regenerate_is_idempotent() {
        let mut store = KeyStore::new(seed(), 4).unwrap();
        let before = store.addresses();
        store.regenerate(4).unwrap();
        assert_eq!(store.addresses(), before);
    }

    #[test]
    fn regenerate_shrinks() {
        let mut store = KeyStore::new(seed(), 4).unwrap();
        store.regenerate(2).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn regenerate_zero_rejected() {
        assert!(matches!(
            KeyStore::new(seed(), 0),
            Err(WalletError::InvalidRequest(_))
        ));
    }

    #[test]
    fn extend_matches_fresh_store() {
        let mut grown = KeyStore::new(seed(), 2).unwrap();
        let added = grown.extend(3).unwrap();
        assert_eq!(added.len(), 3);
        let fresh = KeyStore::new(seed(), 5).unwrap();
        assert_eq!(grown.addresses(), fresh.addresses());
        assert_eq!(grown.count(), 5);
    }

    #[test]
    fn next_address_is_new_key() {
        let mut store = KeyStore::new(seed(), 1).unwrap();
        let uh = store.next_address().unwrap();
        assert_eq!(uh, unlock_hash(&derive_keypair(&seed(), 1).unwrap()));
        assert_ne!(uh, store.default_refund_address());
        assert!(store.key_for(&uh).is_some());
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn addresses_sorted() {
        let store = KeyStore::new(seed(), 8).unwrap();
        let addrs = store.addresses();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
    }
}
