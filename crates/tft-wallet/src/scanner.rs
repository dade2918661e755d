//! Concurrent discovery of the outputs a set of addresses currently owns.
//!
//! A scan fans the addresses out to a bounded pool of tokio workers that
//! pull jobs from a shared queue and report exactly one result per job.
//! Per-address failures do not abort the scan: the caller gets the union of
//! every successful address together with the list of failures.

use std::fmt;
use std::sync::Arc;

use tft_core::address::UnlockHash;
use tft_core::condition::UnlockCondition;
use tft_core::constants::SCAN_WORKER_COUNT;
use tft_core::error::BackendError;
use tft_core::traits::ChainBackend;
use tft_core::types::{AddressHistory, CoinOutput, SpendableOutputs};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::WalletError;

/// One address lookup that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    /// Address whose lookup failed. `None` when a worker died mid-job.
    pub address: Option<UnlockHash>,
    pub reason: String,
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{address}: {}", self.reason),
            None => write!(f, "scan worker: {}", self.reason),
        }
    }
}

/// Outcome of a scan: whatever succeeded plus every failure.
///
/// A non-empty `failures` means `outputs` may be incomplete.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub outputs: SpendableOutputs,
    pub failures: Vec<ScanFailure>,
}

impl ScanResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Combined error listing every failure, one per line.
    pub fn combined_error(&self) -> Option<WalletError> {
        if self.failures.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        Some(WalletError::Backend(lines.join("\n")))
    }

    /// The outputs, or the combined error if any lookup failed.
    pub fn into_result(self) -> Result<SpendableOutputs, WalletError> {
        match self.combined_error() {
            Some(err) => Err(err),
            None => Ok(self.outputs),
        }
    }
}

/// Outputs owned by `address` according to its history.
///
/// Miner payouts only count once `height + maturity_delay < current_height`.
/// Outputs consumed by any input in the history are removed.
pub fn address_outputs(
    address: &UnlockHash,
    history: &AddressHistory,
    current_height: u64,
    maturity_delay: u64,
) -> Result<SpendableOutputs, BackendError> {
    let mut outputs = SpendableOutputs::new();

    for block in &history.blocks {
        if block.miner_payouts.len() != block.miner_payout_ids.len() {
            return Err(BackendError::Decode(format!(
                "block {} lists {} payouts but {} payout ids",
                block.height,
                block.miner_payouts.len(),
                block.miner_payout_ids.len()
            )));
        }
        if block.height.saturating_add(maturity_delay) >= current_height {
            continue;
        }
        for (payout, id) in block.miner_payouts.iter().zip(&block.miner_payout_ids) {
            if payout.unlock_hash == *address {
                outputs.insert(
                    *id,
                    CoinOutput {
                        value: payout.value,
                        condition: UnlockCondition::UnlockHash(payout.unlock_hash),
                    },
                );
            }
        }
    }

    for entry in &history.transactions {
        let tx_outputs = &entry.transaction.coin_outputs;
        if tx_outputs.len() != entry.coin_output_ids.len() {
            return Err(BackendError::Decode(format!(
                "transaction {} lists {} outputs but {} output ids",
                entry.id,
                tx_outputs.len(),
                entry.coin_output_ids.len()
            )));
        }
        for (output, id) in tx_outputs.iter().zip(&entry.coin_output_ids) {
            if output.condition.unlock_hash() == *address {
                outputs.insert(*id, output.clone());
            }
        }
    }

    for entry in &history.transactions {
        for input in &entry.transaction.coin_inputs {
            outputs.remove(&input.parent_id);
        }
    }

    Ok(outputs)
}

/// Bounded worker pool querying a [`ChainBackend`] per address.
#[derive(Debug, Clone)]
pub struct UtxoScanner {
    worker_cap: usize,
}

impl Default for UtxoScanner {
    fn default() -> Self {
        Self::new(SCAN_WORKER_COUNT)
    }
}

type JobOutcome = (UnlockHash, Result<SpendableOutputs, BackendError>);

impl UtxoScanner {
    pub fn new(worker_cap: usize) -> Self {
        Self {
            worker_cap: worker_cap.max(1),
        }
    }

    /// Number of workers a scan over `address_count` addresses starts.
    pub fn pool_size(&self, address_count: usize) -> usize {
        self.worker_cap.min(address_count)
    }

    /// Scan `addresses` and fold every per-address result into one set.
    ///
    /// Fails only if the chain height or constants cannot be fetched.
    /// Per-address failures are reported in [`ScanResult::failures`].
    pub async fn scan(
        &self,
        addresses: &[UnlockHash],
        backend: Arc<dyn ChainBackend>,
    ) -> Result<ScanResult, WalletError> {
        if addresses.is_empty() {
            return Ok(ScanResult::default());
        }

        let current_height = backend.current_height().await?;
        let maturity_delay = backend.chain_constants().await?.maturity_delay;
        let pool = self.pool_size(addresses.len());
        debug!(addresses = addresses.len(), workers = pool, current_height, "starting scan");

        let (job_tx, job_rx) = mpsc::channel::<UnlockHash>(addresses.len());
        for address in addresses {
            job_tx
                .try_send(*address)
                .map_err(|e| WalletError::InternalConsistency(format!("scan queue: {e}")))?;
        }
        drop(job_tx);
        let jobs = Arc::new(Mutex::new(job_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<JobOutcome>(pool);
        let mut workers = Vec::with_capacity(pool);
        for _ in 0..pool {
            let jobs = Arc::clone(&jobs);
            let results = result_tx.clone();
            let backend = Arc::clone(&backend);
            workers.push(tokio::spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(address) = next else { break };
                    let outcome = match backend.address_history(&address).await {
                        Ok(history) => {
                            address_outputs(&address, &history, current_height, maturity_delay)
                        }
                        Err(e) => Err(e),
                    };
                    if results.send((address, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut result = ScanResult::default();
        while let Some((address, outcome)) = result_rx.recv().await {
            match outcome {
                Ok(partial) => {
                    debug!(%address, outputs = partial.len(), "address scanned");
                    result.outputs.extend(partial);
                }
                Err(e) => {
                    warn!(%address, error = %e, "address scan failed");
                    result.failures.push(ScanFailure {
                        address: Some(address),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "scan worker terminated abnormally");
                result.failures.push(ScanFailure {
                    address: None,
                    reason: e.to_string(),
                });
            }
        }

        debug!(
            outputs = result.outputs.len(),
            failures = result.failures.len(),
            "scan finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tft_core::address::UnlockType;
    use tft_core::types::{
        AddressBlock, AddressTransaction, ChainConstants, CoinInput, CoinOutputId, Fulfillment,
        Hash256, MinerPayout, Transaction, TransactionId,
    };

    fn addr(b: u8) -> UnlockHash {
        UnlockHash::new(UnlockType::PubKey, Hash256([b; 32]))
    }

    fn oid(b: u8) -> CoinOutputId {
        CoinOutputId::from([b; 32])
    }

    fn payout_block(height: u64, to: UnlockHash, value: u64, id: CoinOutputId) -> AddressBlock {
        AddressBlock {
            height,
            miner_payouts: vec![MinerPayout { value, unlock_hash: to }],
            miner_payout_ids: vec![id],
        }
    }

    fn paying_tx(to: UnlockHash, value: u64, id: CoinOutputId, spends: &[CoinOutputId]) -> AddressTransaction {
        AddressTransaction {
            id: TransactionId::from([0xEE; 32]),
            transaction: Transaction {
                version: 1,
                coin_inputs: spends
                    .iter()
                    .map(|p| CoinInput { parent_id: *p, fulfillment: Fulfillment::unsigned([0; 32]) })
                    .collect(),
                coin_outputs: vec![CoinOutput { value, condition: UnlockCondition::UnlockHash(to) }],
                miner_fees: vec![1],
                arbitrary_data: Vec::new(),
            },
            coin_output_ids: vec![id],
        }
    }

    #[test]
    fn immature_payout_excluded() {
        let a = addr(1);
        let history = AddressHistory { blocks: vec![payout_block(10, a, 5, oid(1))], transactions: vec![] };
        assert!(address_outputs(&a, &history, 14, 5).unwrap().is_empty());
        assert!(address_outputs(&a, &history, 15, 5).unwrap().is_empty());
        assert_eq!(address_outputs(&a, &history, 16, 5).unwrap().len(), 1);
    }

    #[test]
    fn payouts_to_other_addresses_ignored() {
        let a = addr(1);
        let history = AddressHistory { blocks: vec![payout_block(1, addr(2), 5, oid(1))], transactions: vec![] };
        assert!(address_outputs(&a, &history, 100, 0).unwrap().is_empty());
    }

    #[test]
    fn spent_outputs_removed() {
        let a = addr(1);
        let history = AddressHistory {
            blocks: vec![payout_block(1, a, 5, oid(1))],
            transactions: vec![
                paying_tx(a, 7, oid(2), &[]),
                paying_tx(addr(9), 3, oid(3), &[oid(1)]),
            ],
        };
        let outputs = address_outputs(&a, &history, 100, 0).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[&oid(2)].value, 7);
    }

    #[test]
    fn time_locked_output_to_address_included() {
        let a = addr(1);
        let mut entry = paying_tx(a, 7, oid(2), &[]);
        entry.transaction.coin_outputs[0].condition =
            UnlockCondition::time_locked(1_000, UnlockCondition::UnlockHash(a));
        let history = AddressHistory { blocks: vec![], transactions: vec![entry] };
        assert_eq!(address_outputs(&a, &history, 1, 0).unwrap().len(), 1);
    }

    #[test]
    fn unsupported_outputs_skipped() {
        let a = addr(1);
        let mut entry = paying_tx(a, 7, oid(2), &[]);
        entry.transaction.coin_outputs.push(CoinOutput {
            value: 9,
            condition: UnlockCondition::Unsupported { kind: 4 },
        });
        entry.coin_output_ids.push(oid(3));
        let history = AddressHistory { blocks: vec![], transactions: vec![entry] };
        let outputs = address_outputs(&a, &history, 1, 0).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs.contains_key(&oid(2)));
    }

    #[test]
    fn mismatched_ids_rejected() {
        let a = addr(1);
        let mut block = payout_block(1, a, 5, oid(1));
        block.miner_payout_ids.clear();
        let history = AddressHistory { blocks: vec![block], transactions: vec![] };
        assert!(matches!(address_outputs(&a, &history, 100, 0), Err(BackendError::Decode(_))));
    }

    struct StubBackend {
        histories: HashMap<UnlockHash, AddressHistory>,
        failing: HashSet<UnlockHash>,
        history_calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainBackend for StubBackend {
        async fn current_height(&self) -> Result<u64, BackendError> {
            Ok(100)
        }
        async fn chain_constants(&self) -> Result<ChainConstants, BackendError> {
            Ok(ChainConstants {
                chain_name: "stub".into(),
                minimum_transaction_fee: 1,
                default_transaction_version: 1,
                maturity_delay: 5,
                currency_units: 1_000_000_000,
            })
        }
        async fn address_history(&self, address: &UnlockHash) -> Result<AddressHistory, BackendError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(address) {
                return Err(BackendError::Unavailable("connection refused".into()));
            }
            Ok(self.histories.get(address).cloned().unwrap_or_default())
        }
        async fn submit(&self, _tx: &Transaction) -> Result<TransactionId, BackendError> {
            Err(BackendError::Rejected("stub".into()))
        }
    }

    fn stub(n: u8, failing: &[u8]) -> Arc<StubBackend> {
        let histories = (1..=n)
            .map(|b| {
                (addr(b), AddressHistory { blocks: vec![payout_block(1, addr(b), b as u64, oid(b))], transactions: vec![] })
            })
            .collect();
        Arc::new(StubBackend {
            histories,
            failing: failing.iter().map(|b| addr(*b)).collect(),
            history_calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn pool_size_is_capped() {
        let scanner = UtxoScanner::default();
        assert_eq!(scanner.pool_size(3), 3);
        assert_eq!(scanner.pool_size(100), SCAN_WORKER_COUNT);
    }

    #[tokio::test]
    async fn empty_address_list_makes_no_history_calls() {
        let backend = stub(0, &[]);
        let result = UtxoScanner::default().scan(&[], backend.clone()).await.unwrap();
        assert!(result.outputs.is_empty() && result.is_complete());
        assert_eq!(backend.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unions_all_addresses() {
        let backend = stub(40, &[]);
        let addrs: Vec<_> = (1..=40).map(addr).collect();
        let result = UtxoScanner::default().scan(&addrs, backend.clone()).await.unwrap();
        assert!(result.is_complete());
        assert_eq!(result.outputs.len(), 40);
        assert_eq!(backend.history_calls.load(Ordering::SeqCst), 40);
    }

    #[tokio::test]
    async fn partial_failure_keeps_successes() {
        let backend = stub(3, &[2]);
        let addrs = vec![addr(1), addr(2), addr(3)];
        let result = UtxoScanner::new(2).scan(&addrs, backend).await.unwrap();
        assert_eq!(result.outputs.len(), 2);
        assert!(result.outputs.contains_key(&oid(1)));
        assert!(result.outputs.contains_key(&oid(3)));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].address, Some(addr(2)));

        let err = result.into_result().unwrap_err();
        assert!(matches!(&err, WalletError::Backend(msg) if msg.contains("connection refused")));
    }

    #[tokio::test]
    async fn combined_error_lists_each_failure() {
        let backend = stub(3, &[1, 3]);
        let addrs = vec![addr(1), addr(2), addr(3)];
        let result = UtxoScanner::default().scan(&addrs, backend).await.unwrap();
        let Some(WalletError::Backend(msg)) = result.combined_error() else {
            panic!("expected combined backend error");
        };
        assert_eq!(msg.lines().count(), 2);
        assert!(msg.contains(&addr(1).to_string()));
        assert!(msg.contains(&addr(3).to_string()));
    }
}
