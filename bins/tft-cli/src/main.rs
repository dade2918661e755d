//! tft-cli — command-line wallet for TFT on Rivine explorers.
//!
//! Wallets are stored encrypted under the configured wallet directory and
//! talk to the explorers of the network they were created for.

mod config;
mod explorer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tft_core::address::UnlockHash;
use tft_core::condition::UnlockCondition;
use tft_core::constants::{format_coins, parse_coins};
use tft_core::traits::ChainBackend;
use tft_wallet::mnemonic::mnemonic_to_seed;
use tft_wallet::{FileWalletStore, RefundPolicy, Seed, Wallet, WalletStore};
use tracing::debug;

use crate::config::{CliConfig, FALLBACK_NETWORK};
use crate::explorer::GroupedExplorer;

const PASSWORD_VAR: &str = "TFT_PASSWORD";

/// Command-line TFT wallet.
#[derive(Parser)]
#[command(name = "tft-cli")]
#[command(version, about = "Deterministic TFT wallet for Rivine explorers")]
struct Cli {
    /// Config file (default: ~/.tft/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wallet directory, overriding the config file.
    #[arg(long, global = true)]
    wallet_dir: Option<PathBuf>,

    /// Tracing filter used when RUST_LOG is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a wallet with a fresh random seed.
    Create(CreateArgs),
    /// Restore a wallet from a mnemonic or hex seed.
    Restore(RestoreArgs),
    /// List stored wallets.
    List,
    /// Show the addresses of a wallet.
    Addresses(WalletArgs),
    /// Show unlocked and locked balance.
    Balance(WalletArgs),
    /// List unspent outputs, including per-address scan failures.
    Unspent(WalletArgs),
    /// Send coins to one or more addresses.
    Send(SendArgs),
    /// Derive and persist additional keys.
    LoadKeys(LoadKeysArgs),
    /// Print the wallet's mnemonic.
    Mnemonic(WalletArgs),
}

#[derive(Args)]
struct CreateArgs {
    /// Wallet name.
    name: String,

    /// Network: standard, testnet or devnet.
    #[arg(short, long, default_value = FALLBACK_NETWORK)]
    network: String,

    /// Number of keys to derive (default from config).
    #[arg(short, long)]
    keys: Option<u64>,
}

#[derive(Args)]
struct RestoreArgs {
    /// Wallet name.
    name: String,

    /// Network: standard, testnet or devnet.
    #[arg(short, long, default_value = FALLBACK_NETWORK)]
    network: String,

    /// Number of keys to derive (default from config).
    #[arg(short, long)]
    keys: Option<u64>,

    /// 24-word mnemonic or 64-char hex seed. Prompted when omitted.
    #[arg(short, long)]
    seed: Option<String>,
}

#[derive(Args)]
struct WalletArgs {
    /// Wallet name.
    name: String,
}

#[derive(Args)]
struct LoadKeysArgs {
    /// Wallet name.
    name: String,

    /// Number of keys to add.
    count: u64,
}

#[derive(Args)]
struct SendArgs {
    /// Wallet name.
    name: String,

    /// Recipient address. Repeat for several outputs.
    #[arg(long = "to", required = true)]
    to: Vec<String>,

    /// Amount in TFT (e.g. 10.5), one per --to.
    #[arg(long = "amount", required = true)]
    amount: Vec<String>,

    /// Arbitrary data attached to the transaction.
    #[arg(long)]
    data: Option<String>,

    /// Lock every output until this block height or unix timestamp.
    #[arg(long)]
    lock_time: Option<u64>,

    /// Pay change to a newly derived address instead of the first one.
    #[arg(long)]
    fresh_refund: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };
    if let Some(dir) = cli.wallet_dir.clone() {
        config.wallet_dir = dir;
    }
    if let Some(level) = cli.log_level.clone() {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(wallet_dir = %config.wallet_dir.display(), "configuration loaded");

    match cli.command {
        Commands::Create(args) => wallet_create(&config, args),
        Commands::Restore(args) => wallet_restore(&config, args),
        Commands::List => wallet_list(&config),
        Commands::Addresses(args) => wallet_addresses(&config, args),
        Commands::Balance(args) => wallet_balance(&config, args).await,
        Commands::Unspent(args) => wallet_unspent(&config, args).await,
        Commands::Send(args) => wallet_send(&config, args).await,
        Commands::LoadKeys(args) => wallet_load_keys(&config, args).await,
        Commands::Mnemonic(args) => wallet_mnemonic(&config, args),
    }
}

/// Create a wallet with a random seed and show its backup phrase.
fn wallet_create(config: &CliConfig, args: CreateArgs) -> Result<()> {
    let (network, backend) = connect(config, &args.network)?;
    let store = new_store(config, new_password()?);

    let wallet = Wallet::create(
        &args.name,
        args.keys.unwrap_or(config.default_keys),
        network,
        backend,
        store,
    )
    .context("Failed to create wallet")?;

    println!("\n=== WALLET CREATED ===");
    println!("Name:    {}", wallet.name());
    println!("Network: {network}");
    println!("\nMNEMONIC (BACKUP THIS, 24 WORDS):");
    println!("  {}", wallet.mnemonic()?);
    println!("\nAnyone with this phrase can spend your funds.");
    println!("\nFirst address: {}", wallet.default_address());
    Ok(())
}

/// Restore a wallet from a mnemonic or hex seed.
fn wallet_restore(config: &CliConfig, args: RestoreArgs) -> Result<()> {
    let (network, backend) = connect(config, &args.network)?;

    let seed_input = match args.seed {
        Some(s) => s,
        None => prompt_password("Enter seed (24-word mnemonic or hex)")?,
    };
    let seed = parse_seed_input(&seed_input)?;
    let store = new_store(config, new_password()?);

    let wallet = Wallet::from_seed(
        &args.name,
        seed,
        args.keys.unwrap_or(config.default_keys),
        network,
        backend,
        store,
    )
    .context("Failed to restore wallet")?;

    println!("\n=== WALLET RESTORED ===");
    println!("Name:    {}", wallet.name());
    println!("Network: {network}");
    println!("Keys:    {}", wallet.key_count());
    Ok(())
}

fn wallet_list(config: &CliConfig) -> Result<()> {
    let store = FileWalletStore::new(&config.wallet_dir, Vec::new());
    let names = store.list().context("Failed to list wallets")?;
    if names.is_empty() {
        println!("No wallets in {}", config.wallet_dir.display());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn wallet_addresses(config: &CliConfig, args: WalletArgs) -> Result<()> {
    let wallet = open_wallet(config, &args.name)?;
    for address in wallet.addresses() {
        println!("{address}");
    }
    Ok(())
}

async fn wallet_balance(config: &CliConfig, args: WalletArgs) -> Result<()> {
    let wallet = open_wallet(config, &args.name)?;
    let balance = wallet.balance().await.context("Failed to fetch balance")?;
    let total = balance.total().context("Balance overflows")?;

    println!("\n=== WALLET BALANCE ===");
    println!("Wallet:   {} ({})", wallet.name(), wallet.backend_name());
    println!("Unlocked: {} TFT ({} outputs)", format_coins(balance.unlocked), balance.unlocked_outputs.len());
    println!("Locked:   {} TFT ({} outputs)", format_coins(balance.locked), balance.locked_outputs.len());
    println!("Total:    {} TFT", format_coins(total));
    Ok(())
}

async fn wallet_unspent(config: &CliConfig, args: WalletArgs) -> Result<()> {
    let wallet = open_wallet(config, &args.name)?;
    let result = wallet
        .unspent_outputs()
        .await
        .context("Failed to scan addresses")?;

    let mut outputs: Vec<_> = result.outputs.iter().collect();
    outputs.sort_by_key(|(id, _)| **id);
    for (id, output) in outputs {
        println!("{id}  {} TFT  {}", format_coins(output.value), output.unlock_hash());
    }
    if !result.is_complete() {
        eprintln!("\nIncomplete scan, {} address(es) failed:", result.failures.len());
        for failure in &result.failures {
            eprintln!("  {failure}");
        }
    }
    Ok(())
}

async fn wallet_send(config: &CliConfig, args: SendArgs) -> Result<()> {
    if args.to.len() != args.amount.len() {
        bail!("Each --to needs exactly one --amount");
    }

    let mut amounts = Vec::with_capacity(args.amount.len());
    let mut conditions = Vec::with_capacity(args.to.len());
    for (to, amount) in args.to.iter().zip(&args.amount) {
        let address: UnlockHash = to
            .parse()
            .with_context(|| format!("Invalid recipient address: {to}"))?;
        let value = parse_coins(amount).with_context(|| format!("Invalid amount: {amount}"))?;
        amounts.push(value);
        conditions.push(match args.lock_time {
            Some(lock_time) => UnlockCondition::time_locked(lock_time, address.into()),
            None => address.into(),
        });
    }

    let refund = if args.fresh_refund {
        RefundPolicy::Fresh
    } else {
        RefundPolicy::Default
    };
    let data = args.data.map(String::into_bytes).unwrap_or_default();

    let wallet = open_wallet(config, &args.name)?;
    let txid = wallet
        .transfer_multi(amounts, conditions, data, refund)
        .await
        .context("Transfer failed")?;

    println!("Transaction submitted: {txid}");
    Ok(())
}

async fn wallet_load_keys(config: &CliConfig, args: LoadKeysArgs) -> Result<()> {
    let wallet = open_wallet(config, &args.name)?;
    let added = wallet
        .load_keys(args.count)
        .await
        .context("Failed to load keys")?;
    for address in &added {
        println!("{address}");
    }
    println!("Wallet now has {} keys", wallet.key_count());
    Ok(())
}

fn wallet_mnemonic(config: &CliConfig, args: WalletArgs) -> Result<()> {
    let wallet = open_wallet(config, &args.name)?;
    println!("{}", wallet.mnemonic()?);
    Ok(())
}

/// Open a stored wallet against the explorers of its own network.
fn open_wallet(config: &CliConfig, name: &str) -> Result<Wallet> {
    let store = new_store(config, existing_password()?);
    let data = store
        .load(name)
        .with_context(|| format!("Failed to load wallet '{name}' (check password)"))?;
    let (_, backend) = connect(config, &data.backend)?;
    Wallet::from_data(data, backend, store).context("Failed to open wallet")
}

fn connect(config: &CliConfig, network: &str) -> Result<(&'static str, Arc<dyn ChainBackend>)> {
    let (name, urls) = config.network(network);
    let explorer = GroupedExplorer::new(
        urls.to_vec(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .with_context(|| {
        format!("Failed to set up {name} explorer client (set explorers.{name} in the config)")
    })?;
    Ok((name, Arc::new(explorer)))
}

fn new_store(config: &CliConfig, password: String) -> Arc<FileWalletStore> {
    Arc::new(FileWalletStore::new(&config.wallet_dir, password.into_bytes()))
}

fn parse_seed_input(input: &str) -> Result<Seed> {
    let trimmed = input.trim();
    if trimmed.split_whitespace().count() > 1 {
        mnemonic_to_seed(trimmed).context("Invalid mnemonic")
    } else {
        Seed::from_hex(trimmed).context("Invalid hex seed")
    }
}

fn existing_password() -> Result<String> {
    match password_from_env() {
        Some(password) => Ok(password),
        None => prompt_password("Wallet password"),
    }
}

fn new_password() -> Result<String> {
    if let Some(password) = password_from_env() {
        return Ok(password);
    }
    let password = prompt_password("Enter wallet password")?;
    let confirm = prompt_password("Confirm password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{prompt}: ")).context("Failed to read password")
}

/// Read before prompting, for scripted use.
fn password_from_env() -> Option<String> {
    std::env::var(PASSWORD_VAR).ok().filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_seed_input() {
        let seed = parse_seed_input(&"ab".repeat(32)).unwrap();
        assert_eq!(seed.as_bytes(), &[0xab; 32]);
    }

    #[test]
    fn mnemonic_seed_input() {
        let seed = Seed::from_bytes([3; 32]);
        let phrase = tft_wallet::mnemonic::seed_to_mnemonic(&seed).unwrap();
        assert_eq!(parse_seed_input(&format!("  {phrase} ")).unwrap(), seed);
    }

    #[test]
    fn bad_seed_input() {
        assert!(parse_seed_input("zz").is_err());
        assert!(parse_seed_input("not a valid phrase").is_err());
    }

    #[test]
    fn send_args_parse() {
        let cli = Cli::try_parse_from([
            "tft-cli", "send", "alice", "--to", "a", "--amount", "1", "--to", "b", "--amount",
            "2.5", "--fresh-refund",
        ])
        .unwrap();
        let Commands::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.to, vec!["a", "b"]);
        assert_eq!(args.amount, vec!["1", "2.5"]);
        assert!(args.fresh_refund);
    }
}
