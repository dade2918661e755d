//! # tft-wallet — deterministic-key UTXO wallet engine.
//!
//! Derives spending keys from a seed, discovers owned outputs through a
//! [`ChainBackend`](tft_core::traits::ChainBackend), partitions them by
//! spendability, selects inputs for a payment and signs the result.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`keys`] — Seed, BLAKE3-based key derivation, `KeyStore`
//! - [`mnemonic`] — BIP-39 seed backup
//! - [`scanner`] — concurrent per-address output discovery
//! - [`classifier`] — unlocked / time-locked partition
//! - [`coin_selection`] — first-fit input selection
//! - [`builder`] — transfer requests, drafts and signing
//! - [`reservation`] — cross-transfer output reservations
//! - [`encryption`] — AES-256-GCM with Argon2id keys
//! - [`store`] — wallet persistence
//! - [`wallet`] — the `Wallet` façade

pub mod builder;
pub mod classifier;
pub mod coin_selection;
pub mod encryption;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod reservation;
pub mod scanner;
pub mod store;
pub mod wallet;

pub use builder::{DraftTransaction, RefundPolicy, TransactionBuilder, TransactionSigner, TransferRequest};
pub use classifier::classify;
pub use coin_selection::{CoinSelection, CoinSelector};
pub use error::WalletError;
pub use keys::{KeyStore, Seed, derive_keypair};
pub use reservation::{OutputReservations, Reservation};
pub use scanner::{ScanFailure, ScanResult, UtxoScanner};
pub use store::{FileWalletStore, MemoryWalletStore, WalletData, WalletStore};
pub use wallet::{Wallet, WalletBalance};
