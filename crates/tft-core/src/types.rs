//! Core protocol types: identifiers, coin outputs, transactions and the
//! per-address chain history returned by explorers.
//!
//! All monetary values are in base units (1 TFT = 10^9 base units).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::address::UnlockHash;
use crate::condition::UnlockCondition;
use crate::error::TransactionError;

/// A 32-byte hash value.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            Default, bincode::Encode, bincode::Decode,
        )]
        pub struct $name(pub Hash256);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(Hash256(bytes))
            }
        }
    };
}

hash_id!(
    /// Unique identifier of a coin output. Globally unique across the chain.
    CoinOutputId
);

hash_id!(
    /// Identifier of a transaction.
    TransactionId
);

/// A spendable amount of coins locked behind an unlock condition.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CoinOutput {
    /// Value in base units.
    pub value: u64,
    /// Who (and when) may spend this output.
    pub condition: UnlockCondition,
}

impl CoinOutput {
    /// Address this output is locked to, looking through time locks.
    pub fn unlock_hash(&self) -> UnlockHash {
        self.condition.unlock_hash()
    }
}

/// Proof presented to satisfy an output's unlock condition.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum Fulfillment {
    /// Ed25519 signature by the key the unlock hash commits to.
    ///
    /// An empty `signature` marks an input that has not been signed yet.
    SingleSignature {
        public_key: [u8; 32],
        signature: Vec<u8>,
    },
}

impl Fulfillment {
    /// Unsigned placeholder carrying the spender's public key.
    pub fn unsigned(public_key: [u8; 32]) -> Self {
        Fulfillment::SingleSignature {
            public_key,
            signature: Vec::new(),
        }
    }

    pub fn public_key(&self) -> &[u8; 32] {
        match self {
            Fulfillment::SingleSignature { public_key, .. } => public_key,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Fulfillment::SingleSignature { signature, .. } => !signature.is_empty(),
        }
    }
}

/// A transaction input spending a previous coin output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CoinInput {
    /// The output being consumed.
    pub parent_id: CoinOutputId,
    pub fulfillment: Fulfillment,
}

/// A transaction transferring coins.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Transaction version tag.
    pub version: u8,
    pub coin_inputs: Vec<CoinInput>,
    pub coin_outputs: Vec<CoinOutput>,
    /// Fees paid to the block creator.
    pub miner_fees: Vec<u64>,
    /// Free-form payload, bounded by
    /// [`ARBITRARY_DATA_MAX_SIZE`](crate::constants::ARBITRARY_DATA_MAX_SIZE).
    pub arbitrary_data: Vec<u8>,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 of the canonical bincode encoding).
    pub fn id(&self) -> Result<TransactionId, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(TransactionId(Hash256(blake3::hash(&encoded).into())))
    }

    /// Sum of all coin output values. `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.coin_outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Sum of all miner fees. `None` on overflow.
    pub fn total_miner_fees(&self) -> Option<u64> {
        self.miner_fees
            .iter()
            .try_fold(0u64, |acc, fee| acc.checked_add(*fee))
    }
}

/// Miner payout recorded in a block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MinerPayout {
    pub value: u64,
    pub unlock_hash: UnlockHash,
}

/// A block that references an address, as reported by an explorer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AddressBlock {
    /// Height of the block.
    pub height: u64,
    /// All miner payouts of the block, in block order.
    pub miner_payouts: Vec<MinerPayout>,
    /// IDs of the payouts, parallel to `miner_payouts`.
    pub miner_payout_ids: Vec<CoinOutputId>,
}

/// A transaction that references an address, as reported by an explorer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AddressTransaction {
    pub id: TransactionId,
    pub transaction: Transaction,
    /// IDs of the transaction's coin outputs, parallel to `coin_outputs`.
    pub coin_output_ids: Vec<CoinOutputId>,
}

/// Everything an explorer knows about one address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct AddressHistory {
    pub blocks: Vec<AddressBlock>,
    pub transactions: Vec<AddressTransaction>,
}

/// Chain parameters the wallet needs to build transactions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChainConstants {
    /// Human-readable chain name.
    pub chain_name: String,
    /// Minimum miner fee accepted per transaction, in base units.
    pub minimum_transaction_fee: u64,
    /// Version tag for newly built transactions.
    pub default_transaction_version: u8,
    /// Number of blocks a miner payout must age before it can be spent.
    pub maturity_delay: u64,
    /// Base units per coin.
    pub currency_units: u64,
}

/// Outputs owned by a wallet, keyed by their unique ID.
pub type SpendableOutputs = HashMap<CoinOutputId, CoinOutput>;

/// Total value of a set of outputs. `None` on overflow.
pub fn total_value(outputs: &SpendableOutputs) -> Option<u64> {
    outputs
        .values()
        .try_fold(0u64, |acc, out| acc.checked_add(out.value))
}
