//! Trait interfaces between the wallet and its collaborators.
//!
//! - [`ChainBackend`]: chain queries and transaction submission (an explorer
//!   client in the CLI, an in-memory mock in tests)

use async_trait::async_trait;

use crate::address::UnlockHash;
use crate::error::BackendError;
use crate::types::{AddressHistory, ChainConstants, Transaction, TransactionId};

/// Remote view of the chain consumed by the wallet.
///
/// Implementations must be safe to call from many scan workers at once.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Height of the current chain tip.
    async fn current_height(&self) -> Result<u64, BackendError>;

    /// Chain parameters (minimum fee, transaction version, maturity delay).
    async fn chain_constants(&self) -> Result<ChainConstants, BackendError>;

    /// All blocks and transactions that reference `address`.
    ///
    /// An address the chain has never seen yields an empty history.
    async fn address_history(&self, address: &UnlockHash) -> Result<AddressHistory, BackendError>;

    /// Submit a signed transaction to the transaction pool.
    async fn submit(&self, tx: &Transaction) -> Result<TransactionId, BackendError>;
}
