//! Ed25519 key handling, transaction signing and signature verification.
//!
//! # Signing scheme
//!
//! Every coin input is signed over a **signing hash** committing to:
//! - the transaction version
//! - all input parent IDs and the public keys of their fulfillments
//! - all outputs (value + encoded unlock condition)
//! - the miner fees and the arbitrary data
//! - the index of the input being signed
//!
//! Signatures are excluded so inputs can be signed independently in any
//! order. The input index keeps a signature made for one slot from being
//! accepted at another slot.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::address::UnlockHash;
use crate::error::CryptoError;
use crate::types::{Fulfillment, Hash256, Transaction};

/// Ed25519 keypair for signing transaction inputs.
///
/// The secret half is zeroized on drop by `ed25519-dalek`.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from 32 bytes of secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Address controlled by this keypair.
    pub fn unlock_hash(&self) -> UnlockHash {
        UnlockHash::from_public_key(&self.public_key())
    }

    /// Raw secret key bytes. Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a message, returning the raw 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key.
#[derive(Clone)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key: vk })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes: [u8; 32] = hex::decode(&s)
            .map_err(serde::de::Error::custom)?
            .try_into()
            .map_err(|_| serde::de::Error::custom("public key must be 32 bytes"))?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Compute the signing hash for the coin input at `input_index`.
pub fn signing_hash(tx: &Transaction, input_index: usize) -> Result<Hash256, CryptoError> {
    if input_index >= tx.coin_inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.coin_inputs.len(),
        });
    }

    let mut data = Vec::new();
    data.push(tx.version);

    data.extend_from_slice(&(tx.coin_inputs.len() as u64).to_le_bytes());
    for input in &tx.coin_inputs {
        data.extend_from_slice(input.parent_id.0.as_bytes());
        data.extend_from_slice(input.fulfillment.public_key());
    }

    data.extend_from_slice(&(tx.coin_outputs.len() as u64).to_le_bytes());
    for output in &tx.coin_outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        output.condition.encode_for_signing(&mut data);
    }

    data.extend_from_slice(&(tx.miner_fees.len() as u64).to_le_bytes());
    for fee in &tx.miner_fees {
        data.extend_from_slice(&fee.to_le_bytes());
    }

    data.extend_from_slice(&(tx.arbitrary_data.len() as u64).to_le_bytes());
    data.extend_from_slice(&tx.arbitrary_data);

    data.extend_from_slice(&(input_index as u64).to_le_bytes());

    Ok(Hash256(blake3::hash(&data).into()))
}

/// Sign the coin input at `input_index` in place.
///
/// The fulfillment's public key is set to the keypair's before hashing, so
/// a placeholder carrying a different key is corrected rather than signed.
pub fn sign_input(
    tx: &mut Transaction,
    input_index: usize,
    keypair: &KeyPair,
) -> Result<(), CryptoError> {
    if input_index >= tx.coin_inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.coin_inputs.len(),
        });
    }
    tx.coin_inputs[input_index].fulfillment = Fulfillment::unsigned(keypair.public_key().to_bytes());

    let sighash = signing_hash(tx, input_index)?;
    let signature = keypair.sign(sighash.as_bytes());
    tx.coin_inputs[input_index].fulfillment = Fulfillment::SingleSignature {
        public_key: keypair.public_key().to_bytes(),
        signature: signature.to_vec(),
    };
    Ok(())
}

/// Verify the coin input at `input_index` against the address it spends from.
///
/// Checks that the fulfillment's public key hashes to `expected` and that its
/// signature verifies against the signing hash.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    expected: &UnlockHash,
) -> Result<(), CryptoError> {
    let input = tx
        .coin_inputs
        .get(input_index)
        .ok_or(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.coin_inputs.len(),
        })?;

    let Fulfillment::SingleSignature {
        public_key,
        signature,
    } = &input.fulfillment;

    let pk = PublicKey::from_bytes(public_key)?;
    if UnlockHash::from_public_key(&pk) != *expected {
        return Err(CryptoError::UnlockHashMismatch);
    }

    let sig_bytes: [u8; 64] = signature
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;

    let sighash = signing_hash(tx, input_index)?;
    pk.verify(sighash.as_bytes(), &sig_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::UnlockCondition;
    use crate::constants::COIN;
    use crate::types::{CoinInput, CoinOutput, CoinOutputId};

    fn two_input_tx(kp: &KeyPair) -> Transaction {
        let pk = kp.public_key().to_bytes();
        Transaction {
            version: 1,
            coin_inputs: vec![
                CoinInput {
                    parent_id: CoinOutputId::from([1u8; 32]),
                    fulfillment: Fulfillment::unsigned(pk),
                },
                CoinInput {
                    parent_id: CoinOutputId::from([2u8; 32]),
                    fulfillment: Fulfillment::unsigned(pk),
                },
            ],
            coin_outputs: vec![CoinOutput {
                value: 10 * COIN,
                condition: UnlockCondition::UnlockHash(kp.unlock_hash()),
            }],
            miner_fees: vec![COIN],
            arbitrary_data: Vec::new(),
        }
    }

    #[test]
    fn keypair_from_secret_deterministic() {
        let kp1 = KeyPair::from_secret_bytes([42u8; 32]);
        let kp2 = KeyPair::from_secret_bytes([42u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn keypair_debug_hides_secret() {
        let kp = KeyPair::generate();
        let debug = format!("{kp:?}");
        assert!(debug.contains("public_key"));
        assert!(!debug.contains(&hex::encode(kp.secret_bytes())));
    }

    #[test]
    fn pubkey_serde_json_roundtrip() {
        let pk = KeyPair::generate().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(pk, back);
    }

    #[test]
    fn sign_verify_message() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello tft");
        assert!(kp.public_key().verify(b"hello tft", &sig).is_ok());
        assert_eq!(
            kp.public_key().verify(b"other", &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn signing_hash_differs_per_index() {
        let kp = KeyPair::from_secret_bytes([3u8; 32]);
        let tx = two_input_tx(&kp);
        assert_ne!(signing_hash(&tx, 0).unwrap(), signing_hash(&tx, 1).unwrap());
    }

    #[test]
    fn signing_hash_ignores_signatures() {
        let kp = KeyPair::from_secret_bytes([3u8; 32]);
        let mut tx = two_input_tx(&kp);
        let before = signing_hash(&tx, 1).unwrap();
        sign_input(&mut tx, 0, &kp).unwrap();
        assert_eq!(signing_hash(&tx, 1).unwrap(), before);
    }

    #[test]
    fn signing_hash_commits_to_data_and_fees() {
        let kp = KeyPair::from_secret_bytes([3u8; 32]);
        let tx = two_input_tx(&kp);
        let mut with_data = tx.clone();
        with_data.arbitrary_data = b"memo".to_vec();
        let mut with_fee = tx.clone();
        with_fee.miner_fees = vec![2 * COIN];
        let base = signing_hash(&tx, 0).unwrap();
        assert_ne!(signing_hash(&with_data, 0).unwrap(), base);
        assert_ne!(signing_hash(&with_fee, 0).unwrap(), base);
    }

    #[test]
    fn signing_hash_out_of_bounds() {
        let kp = KeyPair::from_secret_bytes([3u8; 32]);
        let tx = two_input_tx(&kp);
        assert_eq!(
            signing_hash(&tx, 2),
            Err(CryptoError::InputIndexOutOfBounds { index: 2, len: 2 })
        );
    }

    #[test]
    fn sign_and_verify_all_inputs() {
        let kp = KeyPair::from_secret_bytes([9u8; 32]);
        let mut tx = two_input_tx(&kp);
        sign_input(&mut tx, 0, &kp).unwrap();
        sign_input(&mut tx, 1, &kp).unwrap();
        let uh = kp.unlock_hash();
        assert!(verify_input(&tx, 0, &uh).is_ok());
        assert!(verify_input(&tx, 1, &uh).is_ok());
    }

    #[test]
    fn signature_does_not_verify_at_other_slot() {
        let kp = KeyPair::from_secret_bytes([9u8; 32]);
        let mut tx = two_input_tx(&kp);
        sign_input(&mut tx, 0, &kp).unwrap();
        let moved = tx.coin_inputs[0].fulfillment.clone();
        tx.coin_inputs[1].fulfillment = moved;
        assert_eq!(
            verify_input(&tx, 1, &kp.unlock_hash()),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn verify_rejects_wrong_owner() {
        let kp = KeyPair::from_secret_bytes([9u8; 32]);
        let other = KeyPair::from_secret_bytes([10u8; 32]);
        let mut tx = two_input_tx(&kp);
        sign_input(&mut tx, 0, &kp).unwrap();
        assert_eq!(
            verify_input(&tx, 0, &other.unlock_hash()),
            Err(CryptoError::UnlockHashMismatch)
        );
    }

    #[test]
    fn verify_rejects_unsigned_input() {
        let kp = KeyPair::from_secret_bytes([9u8; 32]);
        let tx = two_input_tx(&kp);
        assert_eq!(
            verify_input(&tx, 0, &kp.unlock_hash()),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_output_invalidates_signature() {
        let kp = KeyPair::from_secret_bytes([9u8; 32]);
        let mut tx = two_input_tx(&kp);
        sign_input(&mut tx, 0, &kp).unwrap();
        tx.coin_outputs[0].value += 1;
        assert_eq!(
            verify_input(&tx, 0, &kp.unlock_hash()),
            Err(CryptoError::VerificationFailed)
        );
    }
}
