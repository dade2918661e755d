//! # tft-core
//! Foundation types and traits for the TFT wallet.

pub mod address;
pub mod condition;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod traits;
pub mod types;
