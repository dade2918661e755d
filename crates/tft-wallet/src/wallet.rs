//! The wallet façade: key store, scanning, classification, selection,
//! signing and submission behind one handle.
//!
//! A [`Wallet`] is `Send + Sync` and can be shared across tasks. The key
//! store lock is never held across an `.await`; concurrent transfers are
//! kept from spending the same outputs by [`OutputReservations`]. Key growth
//! is serialized and persisted on the blocking pool before new keys are used.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tft_core::address::UnlockHash;
use tft_core::condition::{FulfillableContext, UnlockCondition};
use tft_core::traits::ChainBackend;
use tft_core::types::{ChainConstants, SpendableOutputs, TransactionId, total_value};
use tracing::{debug, info, warn};

use crate::builder::{RefundPolicy, TransactionBuilder, TransactionSigner, TransferRequest};
use crate::classifier::classify;
use crate::coin_selection::CoinSelector;
use crate::error::WalletError;
use crate::keys::{KeyStore, Seed};
use crate::mnemonic;
use crate::reservation::OutputReservations;
use crate::scanner::{ScanResult, UtxoScanner};
use crate::store::{WalletData, WalletStore};

/// Unlocked and time-locked funds of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WalletBalance {
    /// Spendable now, in base units.
    pub unlocked: u64,
    /// Still time-locked, in base units.
    pub locked: u64,
    pub unlocked_outputs: SpendableOutputs,
    pub locked_outputs: SpendableOutputs,
}

impl WalletBalance {
    /// Unlocked plus locked. `None` on overflow.
    pub fn total(&self) -> Option<u64> {
        self.unlocked.checked_add(self.locked)
    }
}

/// A named deterministic wallet bound to a chain backend and a store.
pub struct Wallet {
    name: String,
    backend_name: String,
    backend: Arc<dyn ChainBackend>,
    store: Arc<dyn WalletStore>,
    keys: RwLock<KeyStore>,
    /// Held while new keys are derived and persisted.
    growth: tokio::sync::Mutex<()>,
    scanner: UtxoScanner,
    reservations: OutputReservations,
}

impl Wallet {
    /// Create and persist a wallet with a random seed.
    pub fn create(
        name: &str,
        keys_to_load: u64,
        backend_name: &str,
        backend: Arc<dyn ChainBackend>,
        store: Arc<dyn WalletStore>,
    ) -> Result<Self, WalletError> {
        Self::from_seed(name, Seed::generate(), keys_to_load, backend_name, backend, store)
    }

    /// Create and persist a wallet restored from a mnemonic phrase.
    pub fn from_mnemonic(
        name: &str,
        phrase: &str,
        keys_to_load: u64,
        backend_name: &str,
        backend: Arc<dyn ChainBackend>,
        store: Arc<dyn WalletStore>,
    ) -> Result<Self, WalletError> {
        let seed = mnemonic::mnemonic_to_seed(phrase)?;
        Self::from_seed(name, seed, keys_to_load, backend_name, backend, store)
    }

    /// Create and persist a wallet from an explicit seed.
    ///
    /// Fails with [`WalletError::WalletExists`] if `name` is already stored.
    pub fn from_seed(
        name: &str,
        seed: Seed,
        keys_to_load: u64,
        backend_name: &str,
        backend: Arc<dyn ChainBackend>,
        store: Arc<dyn WalletStore>,
    ) -> Result<Self, WalletError> {
        if store.exists(name)? {
            return Err(WalletError::WalletExists(name.to_string()));
        }
        let keys = KeyStore::new(seed, keys_to_load)?;
        let data = WalletData {
            name: name.to_string(),
            seed: keys.seed().clone(),
            backend: backend_name.to_string(),
            keys_to_load: keys.count(),
        };
        store.save(&data, true)?;
        info!(wallet = name, backend = backend_name, keys = keys_to_load, "created wallet");
        Ok(Self::assemble(data.name.clone(), data.backend.clone(), keys, backend, store))
    }

    /// Open a stored wallet, deriving its persisted number of keys.
    pub fn load(
        name: &str,
        backend: Arc<dyn ChainBackend>,
        store: Arc<dyn WalletStore>,
    ) -> Result<Self, WalletError> {
        let data = store.load(name)?;
        Self::from_data(data, backend, store)
    }

    /// Open a wallet from already loaded data.
    pub fn from_data(
        data: WalletData,
        backend: Arc<dyn ChainBackend>,
        store: Arc<dyn WalletStore>,
    ) -> Result<Self, WalletError> {
        let WalletData {
            name,
            seed,
            backend: backend_name,
            keys_to_load,
        } = data;
        let keys = KeyStore::new(seed, keys_to_load)?;
        debug!(wallet = %name, keys = keys_to_load, "loaded wallet");
        Ok(Self::assemble(name, backend_name, keys, backend, store))
    }

    fn assemble(
        name: String,
        backend_name: String,
        keys: KeyStore,
        backend: Arc<dyn ChainBackend>,
        store: Arc<dyn WalletStore>,
    ) -> Self {
        Self {
            name,
            backend_name,
            backend,
            store,
            keys: RwLock::new(keys),
            growth: tokio::sync::Mutex::new(()),
            scanner: UtxoScanner::default(),
            reservations: OutputReservations::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn reservations(&self) -> &OutputReservations {
        &self.reservations
    }

    /// Number of derived keys.
    pub fn key_count(&self) -> u64 {
        self.keys.read().count()
    }

    /// All owned addresses, sorted.
    pub fn addresses(&self) -> Vec<UnlockHash> {
        self.keys.read().addresses()
    }

    /// The index-0 address change is paid to by default.
    pub fn default_address(&self) -> UnlockHash {
        self.keys.read().default_refund_address()
    }

    /// The seed as a 24-word mnemonic.
    pub fn mnemonic(&self) -> Result<String, WalletError> {
        mnemonic::seed_to_mnemonic(self.keys.read().seed())
    }

    /// Derive `count` more keys and persist the new key count.
    pub async fn load_keys(&self, count: u64) -> Result<Vec<UnlockHash>, WalletError> {
        self.grow_keys(|keys| keys.extend(count)).await
    }

    /// Apply `derive` to the key store and persist the new key count.
    ///
    /// The store is written outside the key lock. If writing fails the key
    /// store is rolled back to its previous count and the error returned.
    async fn grow_keys<T>(
        &self,
        derive: impl FnOnce(&mut KeyStore) -> Result<T, WalletError>,
    ) -> Result<T, WalletError> {
        let _growth = self.growth.lock().await;
        let (previous, grown, data) = {
            let mut keys = self.keys.write();
            let previous = keys.count();
            let grown = derive(&mut keys)?;
            let data = WalletData {
                name: self.name.clone(),
                seed: keys.seed().clone(),
                backend: self.backend_name.clone(),
                keys_to_load: keys.count(),
            };
            (previous, grown, data)
        };

        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save(&data, false))
            .await
            .map_err(|e| WalletError::InternalConsistency(format!("persist task: {e}")))
            .and_then(|result| result);
        if let Err(e) = saved {
            warn!(
                wallet = %self.name,
                keys = previous,
                error = %e,
                "persisting keys failed, rolling back"
            );
            self.keys.write().regenerate(previous)?;
            return Err(e);
        }
        Ok(grown)
    }

    pub async fn chain_constants(&self) -> Result<ChainConstants, WalletError> {
        Ok(self.backend.chain_constants().await?)
    }

    /// Scan every owned address.
    ///
    /// Partial failures are reported inside the [`ScanResult`]. A complete
    /// scan also releases reservations of outputs that are no longer unspent.
    pub async fn unspent_outputs(&self) -> Result<ScanResult, WalletError> {
        let addresses = self.addresses();
        let result = self
            .scanner
            .scan(&addresses, Arc::clone(&self.backend))
            .await?;
        if result.is_complete() {
            self.reservations.prune(&result.outputs);
        }
        Ok(result)
    }

    /// Owned outputs split into unlocked and locked at the current height and time.
    async fn classified(&self) -> Result<(SpendableOutputs, SpendableOutputs), WalletError> {
        let outputs = self.unspent_outputs().await?.into_result()?;
        let height = self.backend.current_height().await?;
        let ctx = FulfillableContext::now(height);
        Ok(classify(&outputs, &ctx))
    }

    pub async fn balance(&self) -> Result<WalletBalance, WalletError> {
        let (unlocked_outputs, locked_outputs) = self.classified().await?;
        Ok(WalletBalance {
            unlocked: total_value(&unlocked_outputs).ok_or(WalletError::AmountOverflow)?,
            locked: total_value(&locked_outputs).ok_or(WalletError::AmountOverflow)?,
            unlocked_outputs,
            locked_outputs,
        })
    }

    /// Send `amount` to `condition`. See [`Wallet::transfer_multi`].
    pub async fn transfer(
        &self,
        amount: u64,
        condition: UnlockCondition,
        data: Vec<u8>,
        refund: RefundPolicy,
    ) -> Result<TransactionId, WalletError> {
        self.transfer_multi(vec![amount], vec![condition], data, refund)
            .await
    }

    /// Pay each `(amounts[i], conditions[i])` in one signed transaction and submit it.
    ///
    /// The request is validated before the backend is contacted. A scan with
    /// any failed address aborts the transfer.
    pub async fn transfer_multi(
        &self,
        amounts: Vec<u64>,
        conditions: Vec<UnlockCondition>,
        data: Vec<u8>,
        refund: RefundPolicy,
    ) -> Result<TransactionId, WalletError> {
        let request = TransferRequest::new(amounts, conditions, data)?;

        let constants = self.backend.chain_constants().await?;
        let fee = constants.minimum_transaction_fee;
        let (unlocked, _locked) = self.classified().await?;

        let (selection, reservation) = {
            let keys = self.keys.read();
            self.reservations.select(&unlocked, |available| {
                CoinSelector::select(&request, fee, available, &keys)
            })?
        };

        let refund_address = match refund {
            RefundPolicy::Fresh if selection.remainder > 0 => {
                self.grow_keys(KeyStore::next_address).await?
            }
            _ => self.default_address(),
        };

        let tx = {
            let keys = self.keys.read();
            let draft = TransactionBuilder::build(
                &request,
                &selection,
                fee,
                constants.default_transaction_version,
                refund_address,
                &keys,
            )?;
            TransactionSigner::sign(draft, &keys)?
        };

        let txid = self.backend.submit(&tx).await?;
        reservation.commit();
        info!(
            wallet = %self.name,
            %txid,
            inputs = tx.coin_inputs.len(),
            outputs = tx.coin_outputs.len(),
            fee,
            "submitted transaction"
        );
        Ok(txid)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name)
            .field("backend", &self.backend_name)
            .field("keys", &self.key_count())
            .field("reserved", &self.reservations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryWalletStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tft_core::constants::LOCKTIME_THRESHOLD;
    use tft_core::crypto::verify_input;
    use tft_core::error::BackendError;
    use tft_core::types::{
        AddressHistory, AddressTransaction, CoinOutput, CoinOutputId, Transaction,
    };

    #[derive(Default)]
    struct FakeChain {
        height: u64,
        histories: Mutex<HashMap<UnlockHash, AddressHistory>>,
        submitted: Mutex<Vec<Transaction>>,
        reject: bool,
    }

    impl FakeChain {
        fn fund(&self, to: UnlockHash, condition: UnlockCondition, value: u64, id: u8) {
            let entry = AddressTransaction {
                id: TransactionId::from([id; 32]),
                transaction: Transaction {
                    version: 1,
                    coin_outputs: vec![CoinOutput { value, condition }],
                    ..Default::default()
                },
                coin_output_ids: vec![CoinOutputId::from([id; 32])],
            };
            self.histories.lock().entry(to).or_default().transactions.push(entry);
        }
    }

    #[async_trait]
    impl ChainBackend for FakeChain {
        async fn current_height(&self) -> Result<u64, BackendError> {
            Ok(self.height)
        }
        async fn chain_constants(&self) -> Result<ChainConstants, BackendError> {
            Ok(ChainConstants {
                chain_name: "fake".into(),
                minimum_transaction_fee: 1,
                default_transaction_version: 1,
                maturity_delay: 5,
                currency_units: 1,
            })
        }
        async fn address_history(&self, address: &UnlockHash) -> Result<AddressHistory, BackendError> {
            Ok(self.histories.lock().get(address).cloned().unwrap_or_default())
        }
        async fn submit(&self, tx: &Transaction) -> Result<TransactionId, BackendError> {
            if self.reject {
                return Err(BackendError::Rejected("double spend".into()));
            }
            self.submitted.lock().push(tx.clone());
            tx.id().map_err(|e| BackendError::Decode(e.to_string()))
        }
    }

    fn setup(chain: FakeChain) -> (Wallet, Arc<FakeChain>, Arc<MemoryWalletStore>) {
        let chain = Arc::new(chain);
        let store = Arc::new(MemoryWalletStore::new());
        let wallet = Wallet::from_seed(
            "w",
            Seed::from_bytes([1u8; 32]),
            1,
            "devnet",
            chain.clone(),
            store.clone(),
        )
        .unwrap();
        (wallet, chain, store)
    }

    /// Memory store whose updates fail once `full` is set.
    #[derive(Default)]
    struct FullDisk {
        inner: MemoryWalletStore,
        full: AtomicBool,
    }

    impl WalletStore for FullDisk {
        fn exists(&self, name: &str) -> Result<bool, WalletError> {
            self.inner.exists(name)
        }
        fn load(&self, name: &str) -> Result<WalletData, WalletError> {
            self.inner.load(name)
        }
        fn save(&self, data: &WalletData, create: bool) -> Result<(), WalletError> {
            if self.full.load(Ordering::SeqCst) {
                return Err(WalletError::Io("no space left on device".into()));
            }
            self.inner.save(data, create)
        }
    }

    fn setup_full_disk(chain: FakeChain) -> (Wallet, Arc<FakeChain>, Arc<FullDisk>) {
        let chain = Arc::new(chain);
        let store = Arc::new(FullDisk::default());
        let wallet = Wallet::from_seed(
            "w",
            Seed::from_bytes([1u8; 32]),
            1,
            "devnet",
            chain.clone(),
            store.clone(),
        )
        .unwrap();
        store.full.store(true, Ordering::SeqCst);
        (wallet, chain, store)
    }

    fn stranger() -> UnlockCondition {
        UnlockCondition::UnlockHash(KeyStore::new(Seed::from_bytes([2u8; 32]), 1).unwrap().default_refund_address())
    }

    #[test]
    fn duplicate_name_rejected() {
        let (_, chain, store) = setup(FakeChain::default());
        let err = Wallet::from_seed("w", Seed::generate(), 1, "devnet", chain, store).unwrap_err();
        assert_eq!(err, WalletError::WalletExists("w".into()));
    }

    #[test]
    fn load_unknown_wallet() {
        let chain: Arc<dyn ChainBackend> = Arc::new(FakeChain::default());
        let err = Wallet::load("nope", chain, Arc::new(MemoryWalletStore::new())).unwrap_err();
        assert_eq!(err, WalletError::WalletNotFound("nope".into()));
    }

    #[tokio::test]
    async fn load_keys_persists_count() {
        let (wallet, chain, store) = setup(FakeChain::default());
        wallet.load_keys(3).await.unwrap();
        assert_eq!(wallet.addresses().len(), 4);
        assert_eq!(store.load("w").unwrap().keys_to_load, 4);

        let reloaded = Wallet::load("w", chain, store).unwrap();
        assert_eq!(reloaded.addresses(), wallet.addresses());
    }

    #[tokio::test]
    async fn load_keys_rolled_back_when_save_fails() {
        let (wallet, _, store) = setup_full_disk(FakeChain::default());
        let before = wallet.addresses();

        let err = wallet.load_keys(3).await.unwrap_err();

        assert!(matches!(err, WalletError::Io(_)));
        assert_eq!(wallet.key_count(), 1);
        assert_eq!(wallet.addresses(), before);
        assert_eq!(store.load("w").unwrap().keys_to_load, 1);
    }

    #[tokio::test]
    async fn concurrent_key_growth_is_persisted_in_full() {
        let (wallet, _, store) = setup(FakeChain::default());
        let (a, b) = tokio::join!(wallet.load_keys(2), wallet.load_keys(3));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.len() + b.len(), 5);
        assert!(a.iter().all(|addr| !b.contains(addr)));
        assert_eq!(wallet.key_count(), 6);
        assert_eq!(store.load("w").unwrap().keys_to_load, 6);
    }

    #[test]
    fn mnemonic_restores_same_addresses() {
        let (wallet, chain, _) = setup(FakeChain::default());
        let phrase = wallet.mnemonic().unwrap();
        let restored = Wallet::from_mnemonic(
            "copy",
            &phrase,
            1,
            "devnet",
            chain,
            Arc::new(MemoryWalletStore::new()),
        )
        .unwrap();
        assert_eq!(restored.addresses(), wallet.addresses());
    }

    #[tokio::test]
    async fn balance_splits_locked_funds() {
        let (wallet, chain, _) = setup(FakeChain { height: 100, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, UnlockCondition::UnlockHash(me), 40, 1);
        chain.fund(me, UnlockCondition::time_locked(200, me.into()), 25, 2);
        chain.fund(me, UnlockCondition::time_locked(LOCKTIME_THRESHOLD + 1, me.into()), 5, 3);

        let balance = wallet.balance().await.unwrap();
        // The timestamp lock lies in the past.
        assert_eq!(balance.unlocked, 45);
        assert_eq!(balance.locked, 25);
        assert_eq!(balance.locked_outputs.len(), 1);
        assert_eq!(balance.total(), Some(70));
    }

    #[tokio::test]
    async fn transfer_signs_and_submits() {
        let (wallet, chain, _) = setup(FakeChain { height: 100, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, me.into(), 100, 1);

        wallet
            .transfer(50, stranger(), b"hi".to_vec(), RefundPolicy::Default)
            .await
            .unwrap();

        let submitted = chain.submitted.lock();
        let tx = &submitted[0];
        assert_eq!(tx.coin_outputs.len(), 2);
        assert_eq!(tx.coin_outputs[1].value, 49);
        assert_eq!(tx.coin_outputs[1].unlock_hash(), me);
        verify_input(tx, 0, &me).unwrap();
    }

    #[tokio::test]
    async fn fresh_refund_extends_and_persists() {
        let (wallet, chain, store) = setup(FakeChain { height: 100, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, me.into(), 100, 1);

        wallet
            .transfer(10, stranger(), Vec::new(), RefundPolicy::Fresh)
            .await
            .unwrap();

        assert_eq!(wallet.key_count(), 2);
        assert_eq!(store.load("w").unwrap().keys_to_load, 2);
        let change = chain.submitted.lock()[0].coin_outputs[1].unlock_hash();
        assert_ne!(change, me);
        assert!(wallet.addresses().contains(&change));
    }

    #[tokio::test]
    async fn fresh_refund_rolled_back_when_save_fails() {
        let (wallet, chain, store) = setup_full_disk(FakeChain { height: 100, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, me.into(), 100, 1);

        let err = wallet
            .transfer(10, stranger(), Vec::new(), RefundPolicy::Fresh)
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::Io(_)));
        assert_eq!(wallet.key_count(), 1);
        assert_eq!(wallet.addresses(), vec![me]);
        assert!(wallet.reservations().is_empty());
        assert!(chain.submitted.lock().is_empty());
        assert_eq!(store.load("w").unwrap().keys_to_load, 1);

        // The released output is still spendable with the default refund.
        wallet
            .transfer(10, stranger(), Vec::new(), RefundPolicy::Default)
            .await
            .unwrap();
        assert_eq!(chain.submitted.lock().len(), 1);
    }

    #[tokio::test]
    async fn fresh_refund_skipped_on_exact_change() {
        let (wallet, chain, _) = setup(FakeChain { height: 100, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, me.into(), 100, 1);

        wallet
            .transfer(99, stranger(), Vec::new(), RefundPolicy::Fresh)
            .await
            .unwrap();
        assert_eq!(wallet.key_count(), 1);
    }

    #[tokio::test]
    async fn rejected_submission_releases_outputs() {
        let (wallet, chain, _) = setup(FakeChain { height: 100, reject: true, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, me.into(), 100, 1);

        let err = wallet
            .transfer(10, stranger(), Vec::new(), RefundPolicy::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Backend(_)));
        assert!(wallet.reservations().is_empty());
    }

    #[tokio::test]
    async fn submitted_outputs_not_reselected() {
        let (wallet, chain, _) = setup(FakeChain { height: 100, ..Default::default() });
        let me = wallet.default_address();
        chain.fund(me, me.into(), 100, 1);

        wallet
            .transfer(10, stranger(), Vec::new(), RefundPolicy::Default)
            .await
            .unwrap();
        // The chain has not seen the spend yet, so the output is still reported.
        let err = wallet
            .transfer(10, stranger(), Vec::new(), RefundPolicy::Default)
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 0, need: 11 });
    }
}
