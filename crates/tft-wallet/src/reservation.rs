//! Per-wallet table of outputs claimed by in-flight or submitted transfers.
//!
//! Selection and reservation happen under one lock, so two concurrent
//! transfers on the same wallet never pick the same output. A [`Reservation`]
//! releases its outputs when dropped unless it was committed after a
//! successful submission; committed outputs stay reserved until a complete
//! scan stops reporting them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tft_core::types::{CoinOutputId, SpendableOutputs};
use tracing::debug;

use crate::coin_selection::CoinSelection;
use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Selected by a transfer that has not been submitted yet.
    Pending,
    /// Spent by a submitted transaction that may not be confirmed yet.
    Committed,
}

/// Shared reservation table. Clones refer to the same table.
#[derive(Debug, Clone, Default)]
pub struct OutputReservations {
    inner: Arc<Mutex<HashMap<CoinOutputId, State>>>,
}

impl OutputReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reserved(&self, id: &CoinOutputId) -> bool {
        self.inner.lock().contains_key(id)
    }

    /// Number of reserved outputs, pending and committed.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Run `select` over the unreserved part of `outputs` and reserve what it picks.
    ///
    /// The table stays locked for the whole call.
    pub fn select<F>(
        &self,
        outputs: &SpendableOutputs,
        select: F,
    ) -> Result<(CoinSelection, Reservation), WalletError>
    where
        F: FnOnce(&SpendableOutputs) -> Result<CoinSelection, WalletError>,
    {
        let mut table = self.inner.lock();
        let available: SpendableOutputs = outputs
            .iter()
            .filter(|(id, _)| !table.contains_key(*id))
            .map(|(id, out)| (*id, out.clone()))
            .collect();

        let selection = select(&available)?;
        let ids: Vec<CoinOutputId> = selection.inputs.iter().map(|(id, _)| *id).collect();
        for id in &ids {
            table.insert(*id, State::Pending);
        }
        debug!(reserved = ids.len(), "reserved outputs");

        let reservation = Reservation {
            table: Arc::clone(&self.inner),
            ids,
            committed: false,
        };
        Ok((selection, reservation))
    }

    /// Forget committed outputs a complete scan no longer reports as unspent.
    pub fn prune(&self, unspent: &SpendableOutputs) {
        let mut table = self.inner.lock();
        let before = table.len();
        table.retain(|id, state| *state == State::Pending || unspent.contains_key(id));
        let pruned = before - table.len();
        if pruned > 0 {
            debug!(pruned, "released confirmed reservations");
        }
    }
}

/// Claim on the outputs of one transfer.
#[derive(Debug)]
#[must_use = "dropping a reservation releases its outputs"]
pub struct Reservation {
    table: Arc<Mutex<HashMap<CoinOutputId, State>>>,
    ids: Vec<CoinOutputId>,
    committed: bool,
}

impl Reservation {
    /// Keep the outputs reserved after the transaction was accepted.
    pub fn commit(mut self) {
        let mut table = self.table.lock();
        for id in &self.ids {
            table.insert(*id, State::Committed);
        }
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut table = self.table.lock();
        for id in &self.ids {
            if table.get(id) == Some(&State::Pending) {
                table.remove(id);
            }
        }
    }
}
