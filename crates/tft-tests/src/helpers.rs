//! Shared fixtures: an in-memory chain backend and wallet constructors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tft_core::address::{UnlockHash, UnlockType};
use tft_core::condition::UnlockCondition;
use tft_core::error::BackendError;
use tft_core::traits::ChainBackend;
use tft_core::types::{
    AddressBlock, AddressHistory, AddressTransaction, ChainConstants, CoinOutput, CoinOutputId,
    Hash256, MinerPayout, Transaction, TransactionId,
};
use tft_wallet::{MemoryWalletStore, Seed, Wallet};

/// Seed used by [`wallet_with`].
pub const TEST_SEED: [u8; 32] = [7u8; 32];

/// Chain backend serving canned address histories.
pub struct MockBackend {
    height: u64,
    maturity_delay: u64,
    fee: u64,
    histories: Mutex<HashMap<UnlockHash, AddressHistory>>,
    failing: Mutex<HashSet<UnlockHash>>,
    history_calls: AtomicUsize,
    submitted: Mutex<Vec<Transaction>>,
}

impl MockBackend {
    pub fn new(height: u64, maturity_delay: u64, fee: u64) -> Self {
        Self {
            height,
            maturity_delay,
            fee,
            histories: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            history_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Add a confirmed transaction paying `value` to `condition`, indexed under
    /// the condition's address. `tag` makes the IDs unique.
    pub fn fund(&self, condition: UnlockCondition, value: u64, tag: u8) -> CoinOutputId {
        let id = CoinOutputId::from([tag; 32]);
        let entry = AddressTransaction {
            id: TransactionId::from([tag; 32]),
            transaction: Transaction {
                version: 1,
                coin_outputs: vec![CoinOutput {
                    value,
                    condition: condition.clone(),
                }],
                ..Default::default()
            },
            coin_output_ids: vec![id],
        };
        self.histories
            .lock()
            .entry(condition.unlock_hash())
            .or_default()
            .transactions
            .push(entry);
        id
    }

    /// Add a block at `height` paying `value` to `address` as a miner payout.
    pub fn mine(&self, address: UnlockHash, height: u64, value: u64, tag: u8) -> CoinOutputId {
        let id = CoinOutputId::from([tag; 32]);
        let block = AddressBlock {
            height,
            miner_payouts: vec![MinerPayout {
                value,
                unlock_hash: address,
            }],
            miner_payout_ids: vec![id],
        };
        self.histories.lock().entry(address).or_default().blocks.push(block);
        id
    }

    /// Make every history lookup for `address` fail.
    pub fn fail_address(&self, address: UnlockHash) {
        self.failing.lock().insert(address);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ChainBackend for MockBackend {
    async fn current_height(&self) -> Result<u64, BackendError> {
        Ok(self.height)
    }

    async fn chain_constants(&self) -> Result<ChainConstants, BackendError> {
        Ok(ChainConstants {
            chain_name: "mock".into(),
            minimum_transaction_fee: self.fee,
            default_transaction_version: 1,
            maturity_delay: self.maturity_delay,
            currency_units: 1,
        })
    }

    async fn address_history(&self, address: &UnlockHash) -> Result<AddressHistory, BackendError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers interleave.
        tokio::task::yield_now().await;
        if self.failing.lock().contains(address) {
            return Err(BackendError::Unavailable(format!("lookup of {address} failed")));
        }
        Ok(self.histories.lock().get(address).cloned().unwrap_or_default())
    }

    async fn submit(&self, tx: &Transaction) -> Result<TransactionId, BackendError> {
        tokio::task::yield_now().await;
        self.submitted.lock().push(tx.clone());
        tx.id().map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Address not owned by any test wallet.
pub fn stranger(tag: u8) -> UnlockHash {
    UnlockHash::new(UnlockType::PubKey, Hash256([tag; 32]))
}

/// Fresh in-memory wallet named `name` over [`TEST_SEED`] with `keys` keys.
pub fn wallet_with(backend: Arc<MockBackend>, name: &str, keys: u64) -> Wallet {
    Wallet::from_seed(
        name,
        Seed::from_bytes(TEST_SEED),
        keys,
        "devnet",
        backend,
        Arc::new(MemoryWalletStore::new()),
    )
    .expect("in-memory wallet creation")
}
