//! Transfer requests, draft construction and signing.
//!
//! 1. Validate a [`TransferRequest`] (before anything touches the backend)
//! 2. Turn a [`CoinSelection`] into an unsigned [`DraftTransaction`]
//! 3. Sign every input with [`TransactionSigner`]

use std::collections::HashMap;

use tft_core::address::UnlockHash;
use tft_core::condition::UnlockCondition;
use tft_core::constants::ARBITRARY_DATA_MAX_SIZE;
use tft_core::crypto::sign_input;
use tft_core::types::{CoinInput, CoinOutput, CoinOutputId, Fulfillment, Transaction};

use crate::coin_selection::CoinSelection;
use crate::error::WalletError;
use crate::keys::KeyStore;

/// Where change is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefundPolicy {
    /// The wallet's index-0 address.
    #[default]
    Default,
    /// A newly derived address, persisted before signing.
    Fresh,
}

/// A validated set of outputs to pay plus optional arbitrary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    outputs: Vec<CoinOutput>,
    arbitrary_data: Vec<u8>,
}

impl TransferRequest {
    /// Pair `amounts` with `conditions` (same order) and validate the result.
    pub fn new(
        amounts: Vec<u64>,
        conditions: Vec<UnlockCondition>,
        arbitrary_data: Vec<u8>,
    ) -> Result<Self, WalletError> {
        if arbitrary_data.len() > ARBITRARY_DATA_MAX_SIZE {
            return Err(WalletError::ArbitraryDataTooLarge {
                size: arbitrary_data.len(),
                max: ARBITRARY_DATA_MAX_SIZE,
            });
        }
        if amounts.is_empty() {
            return Err(WalletError::InvalidRequest("no outputs requested".into()));
        }
        if amounts.len() != conditions.len() {
            return Err(WalletError::InvalidRequest(format!(
                "{} amounts but {} conditions",
                amounts.len(),
                conditions.len()
            )));
        }
        if let Some(i) = amounts.iter().position(|a| *a == 0) {
            return Err(WalletError::InvalidRequest(format!("output {i} has zero value")));
        }

        let outputs = amounts
            .into_iter()
            .zip(conditions)
            .map(|(value, condition)| CoinOutput { value, condition })
            .collect();
        let request = Self {
            outputs,
            arbitrary_data,
        };
        request.total_value()?;
        Ok(request)
    }

    pub fn outputs(&self) -> &[CoinOutput] {
        &self.outputs
    }

    pub fn arbitrary_data(&self) -> &[u8] {
        &self.arbitrary_data
    }

    /// Sum of the requested output values.
    pub fn total_value(&self) -> Result<u64, WalletError> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
            .ok_or(WalletError::AmountOverflow)
    }
}

/// Unsigned transaction together with the outputs it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftTransaction {
    pub tx: Transaction,
    /// Spent outputs by ID, used to find each input's signing key.
    pub spent: HashMap<CoinOutputId, CoinOutput>,
}

/// Assembles drafts from selections.
pub struct TransactionBuilder;

impl TransactionBuilder {
    /// Build the unsigned draft for `selection`.
    ///
    /// Outputs keep the request's order; a change output of
    /// `selection.remainder` to `refund` is appended only when non-zero.
    pub fn build(
        request: &TransferRequest,
        selection: &CoinSelection,
        fee: u64,
        version: u8,
        refund: UnlockHash,
        keys: &KeyStore,
    ) -> Result<DraftTransaction, WalletError> {
        let mut coin_inputs = Vec::with_capacity(selection.inputs.len());
        let mut spent = HashMap::with_capacity(selection.inputs.len());
        for (id, output) in &selection.inputs {
            let owner = output.unlock_hash();
            let kp = keys.key_for(&owner).ok_or_else(|| {
                WalletError::InternalConsistency(format!("no key for selected output {id}"))
            })?;
            coin_inputs.push(CoinInput {
                parent_id: *id,
                fulfillment: Fulfillment::unsigned(kp.public_key().to_bytes()),
            });
            spent.insert(*id, output.clone());
        }

        let mut coin_outputs = request.outputs().to_vec();
        if selection.remainder > 0 {
            coin_outputs.push(CoinOutput {
                value: selection.remainder,
                condition: UnlockCondition::UnlockHash(refund),
            });
        }

        let tx = Transaction {
            version,
            coin_inputs,
            coin_outputs,
            miner_fees: vec![fee],
            arbitrary_data: request.arbitrary_data().to_vec(),
        };
        let paid = tx
            .total_output_value()
            .zip(tx.total_miner_fees())
            .and_then(|(outputs, fees)| outputs.checked_add(fees));
        if paid != Some(selection.input_value) {
            return Err(WalletError::InternalConsistency(format!(
                "draft pays {paid:?} but spends {}",
                selection.input_value
            )));
        }
        Ok(DraftTransaction { tx, spent })
    }
}

/// Attaches a signature fulfillment to every input of a draft.
pub struct TransactionSigner;

impl TransactionSigner {
    /// Sign every input. Any failure discards the whole draft.
    pub fn sign(draft: DraftTransaction, keys: &KeyStore) -> Result<Transaction, WalletError> {
        let DraftTransaction { mut tx, spent } = draft;
        for index in 0..tx.coin_inputs.len() {
            let parent = tx.coin_inputs[index].parent_id;
            let output = spent.get(&parent).ok_or_else(|| {
                WalletError::InternalConsistency(format!("input {index} spends unknown output {parent}"))
            })?;
            let owner = output.unlock_hash();
            let kp = keys.key_for(&owner).ok_or_else(|| {
                WalletError::InternalConsistency(format!("no key for {owner} (input {index})"))
            })?;
            sign_input(&mut tx, index, kp)
                .map_err(|e| WalletError::SigningFailure(format!("input {index}: {e}")))?;
        }
        Ok(tx)
    }
}
