//! Integration test suite for the TFT wallet engine.
//!
//! The scenarios drive a full [`Wallet`](tft_wallet::Wallet) against an
//! in-memory chain backend; the property tests pin down key derivation,
//! classification and coin selection under randomized inputs.

pub mod helpers;
