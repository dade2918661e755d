//! BIP-39 mnemonic backup and restoration of wallet seeds.

use bip39::{Language, Mnemonic};

use crate::error::WalletError;
use crate::keys::{SEED_LEN, Seed};

/// Render a seed as its 24-word English mnemonic.
pub fn seed_to_mnemonic(seed: &Seed) -> Result<String, WalletError> {
    let m = Mnemonic::from_entropy_in(Language::English, seed.as_bytes())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(m.to_string())
}

/// Parse a mnemonic phrase back into the seed it encodes.
///
/// Whitespace is normalized and the phrase lowercased before parsing.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let m = Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    let entropy = m.to_entropy();
    let bytes: [u8; SEED_LEN] = entropy.as_slice().try_into().map_err(|_| {
        WalletError::InvalidMnemonic(format!(
            "expected {SEED_LEN} bytes of entropy, got {}",
            entropy.len()
        ))
    })?;
    Ok(Seed::from_bytes(bytes))
}
