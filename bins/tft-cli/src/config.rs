//! CLI configuration: built-in defaults, then `~/.tft/config.toml`, then
//! `TFT_`-prefixed environment variables (`TFT_LOG_LEVEL`,
//! `TFT_EXPLORERS__TESTNET=url1,url2`, ...).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::warn;

/// Network used when a wallet names one this build does not know.
pub const FALLBACK_NETWORK: &str = "devnet";

/// The only network with built-in explorers. Wallet addresses use this
/// workspace's own checksum, which public tfchain explorers do not accept,
/// so standard and testnet URLs have to be configured explicitly.
const DEVNET_EXPLORERS: &[&str] = &["http://localhost:23110"];

/// Explorer URLs per named network, tried in order.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExplorerUrls {
    pub standard: Vec<String>,
    pub testnet: Vec<String>,
    pub devnet: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Directory holding `<name>.wallet` files.
    pub wallet_dir: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Keys derived for new wallets.
    pub default_keys: u64,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    pub explorers: ExplorerUrls,
}

/// `~/.tft`, or `./.tft` without a home directory.
pub fn tft_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tft")
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl CliConfig {
    /// Load from the default file location.
    pub fn load() -> Result<Self> {
        Self::load_from(&tft_home().join("config.toml"))
    }

    /// Load with `path` as the (optional) config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let wallet_dir = tft_home().join("wallets");
        let settings = Config::builder()
            .set_default("wallet_dir", wallet_dir.to_string_lossy().to_string())?
            .set_default("log_level", "info")?
            .set_default("default_keys", 1)?
            .set_default("request_timeout_secs", 30)?
            .set_default("explorers.standard", Vec::<String>::new())?
            .set_default("explorers.testnet", Vec::<String>::new())?
            .set_default("explorers.devnet", urls(DEVNET_EXPLORERS))?
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("TFT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("explorers.standard")
                    .with_list_parse_key("explorers.testnet")
                    .with_list_parse_key("explorers.devnet")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Resolve a network name to its canonical name and explorer URLs.
    ///
    /// Unknown names fall back to devnet.
    pub fn network(&self, name: &str) -> (&'static str, &[String]) {
        match name {
            "standard" => ("standard", &self.explorers.standard),
            "testnet" => ("testnet", &self.explorers.testnet),
            "devnet" => ("devnet", &self.explorers.devnet),
            other => {
                warn!(network = other, "unknown network, using {FALLBACK_NETWORK}");
                (FALLBACK_NETWORK, &self.explorers.devnet)
            }
        }
    }
}
