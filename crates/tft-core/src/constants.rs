//! Protocol and wallet constants. All monetary values in base units
//! (1 TFT = 10^9 base units).

/// Base units per whole coin.
pub const COIN: u64 = 1_000_000_000;

/// Number of decimal places of [`COIN`].
pub const COIN_PRECISION: u32 = 9;

/// Maximum size in bytes of a transaction's arbitrary data payload.
pub const ARBITRARY_DATA_MAX_SIZE: usize = 83;

/// Upper bound on concurrent address lookups during a UTXO scan.
pub const SCAN_WORKER_COUNT: usize = 25;

/// Lock values below this threshold are block heights, values at or above it
/// are Unix timestamps in seconds.
pub const LOCKTIME_THRESHOLD: u64 = 500_000_000;

/// Transaction version produced when the backend does not report one.
pub const DEFAULT_TRANSACTION_VERSION: u8 = 1;

/// Number of keys derived for a freshly created wallet.
pub const DEFAULT_KEYS_TO_LOAD: u64 = 1;

/// Specifier prefixed to an Ed25519 public key when hashing it into an unlock hash.
pub const ED25519_SPECIFIER: &[u8; 7] = b"ed25519";

/// Length of an encoded unlock hash checksum in bytes.
pub const UNLOCK_HASH_CHECKSUM_SIZE: usize = 6;

/// Format an amount of base units as a decimal coin string.
///
/// Trailing zeros of the fractional part are trimmed: `1_500_000_000`
/// renders as `"1.5"`, `2 * COIN` as `"2"`.
pub fn format_coins(amount: u64) -> String {
    let whole = amount / COIN;
    let frac = amount % COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:0width$}", width = COIN_PRECISION as usize);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

/// Parse a decimal coin string (`"12"`, `"0.25"`) into base units.
///
/// Returns `None` for malformed input, more than [`COIN_PRECISION`]
/// fractional digits, or overflow.
pub fn parse_coins(s: &str) -> Option<u64> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > COIN_PRECISION as usize {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_units: u64 = 0;
    if !frac.is_empty() {
        let padded = format!("{frac:0<width$}", width = COIN_PRECISION as usize);
        frac_units = padded.parse().ok()?;
    }
    whole.checked_mul(COIN)?.checked_add(frac_units)
}
