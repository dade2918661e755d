//! Greedy input selection.
//!
//! Candidates are visited in output ID order and added until their value
//! covers the requested outputs plus the miner fee. This is first-fit, not
//! minimal-change: the last input may overshoot.

use tft_core::types::{CoinOutput, CoinOutputId, SpendableOutputs, total_value};

use crate::builder::TransferRequest;
use crate::error::WalletError;
use crate::keys::KeyStore;

/// Inputs chosen to fund a transfer and the resulting balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// Chosen outputs in selection order.
    pub inputs: Vec<(CoinOutputId, CoinOutput)>,
    /// Sum of the chosen outputs.
    pub input_value: u64,
    /// Requested outputs plus the miner fee.
    pub required: u64,
    /// `input_value - required`; paid back as change when non-zero.
    pub remainder: u64,
}

/// First-fit coin selector.
pub struct CoinSelector;

impl CoinSelector {
    /// Select inputs from `available` covering `request` plus `fee`.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] before selecting anything
    /// when `available` cannot cover the total, and with
    /// [`WalletError::InternalConsistency`] if a chosen output is not owned by
    /// a key in `keys`.
    pub fn select(
        request: &TransferRequest,
        fee: u64,
        available: &SpendableOutputs,
        keys: &KeyStore,
    ) -> Result<CoinSelection, WalletError> {
        let required = request
            .total_value()?
            .checked_add(fee)
            .ok_or(WalletError::AmountOverflow)?;

        let have = total_value(available).ok_or(WalletError::AmountOverflow)?;
        if have < required {
            return Err(WalletError::InsufficientFunds {
                have,
                need: required,
            });
        }

        let mut candidates: Vec<(&CoinOutputId, &CoinOutput)> = available.iter().collect();
        candidates.sort_by_key(|(id, _)| **id);

        let mut inputs = Vec::new();
        let mut input_value: u64 = 0;
        for (id, output) in candidates {
            if input_value >= required {
                break;
            }
            let owner = output.unlock_hash();
            if !keys.contains(&owner) {
                return Err(WalletError::InternalConsistency(format!(
                    "output {id} is locked to {owner}, which has no key in this wallet"
                )));
            }
            input_value = input_value
                .checked_add(output.value)
                .ok_or(WalletError::AmountOverflow)?;
            inputs.push((*id, output.clone()));
        }

        Ok(CoinSelection {
            inputs,
            input_value,
            required,
            remainder: input_value - required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Seed;
    use tft_core::condition::UnlockCondition;
    use tft_core::types::CoinOutputId;

    fn keys() -> KeyStore {
        KeyStore::new(Seed::from_bytes([4u8; 32]), 2).unwrap()
    }

    fn owned(keys: &KeyStore, values: &[u64]) -> SpendableOutputs {
        let owner = UnlockCondition::UnlockHash(keys.default_refund_address());
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                (
                    CoinOutputId::from([i as u8 + 1; 32]),
                    CoinOutput { value: *v, condition: owner.clone() },
                )
            })
            .collect()
    }

    fn request(amounts: &[u64]) -> TransferRequest {
        let to = UnlockCondition::Nil;
        TransferRequest::new(amounts.to_vec(), vec![to; amounts.len()], Vec::new()).unwrap()
    }

    #[test]
    fn single_output_covers() {
        let keys = keys();
        let sel = CoinSelector::select(&request(&[50]), 1, &owned(&keys, &[100]), &keys).unwrap();
        assert_eq!(sel.inputs.len(), 1);
        assert_eq!(sel.input_value, 100);
        assert_eq!(sel.required, 51);
        assert_eq!(sel.remainder, 49);
    }

    #[test]
    fn insufficient_funds_checked_up_front() {
        let keys = keys();
        let err = CoinSelector::select(&request(&[100]), 1, &owned(&keys, &[100]), &keys).unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 100, need: 101 });
    }

    #[test]
    fn stops_once_covered() {
        let keys = keys();
        let sel = CoinSelector::select(&request(&[15]), 0, &owned(&keys, &[10, 10, 10]), &keys).unwrap();
        assert_eq!(sel.inputs.len(), 2);
        assert_eq!(sel.remainder, 5);
    }

    #[test]
    fn exact_amount_leaves_no_remainder() {
        let keys = keys();
        let sel = CoinSelector::select(&request(&[19]), 1, &owned(&keys, &[10, 10]), &keys).unwrap();
        assert_eq!(sel.remainder, 0);
        assert_eq!(sel.input_value, sel.required);
    }

    #[test]
    fn selection_order_is_by_output_id() {
        let keys = keys();
        let sel = CoinSelector::select(&request(&[1]), 0, &owned(&keys, &[10, 20, 30]), &keys).unwrap();
        assert_eq!(sel.inputs[0].0, CoinOutputId::from([1u8; 32]));
    }

    #[test]
    fn foreign_output_is_internal_error() {
        let keys = keys();
        let mut available = SpendableOutputs::new();
        available.insert(
            CoinOutputId::from([9u8; 32]),
            CoinOutput { value: 100, condition: UnlockCondition::Nil },
        );
        let err = CoinSelector::select(&request(&[1]), 0, &available, &keys).unwrap_err();
        assert!(matches!(err, WalletError::InternalConsistency(_)));
    }

    #[test]
    fn fee_overflow_detected() {
        let keys = keys();
        let err = CoinSelector::select(&request(&[u64::MAX]), 1, &owned(&keys, &[1]), &keys).unwrap_err();
        assert_eq!(err, WalletError::AmountOverflow);
    }
}
