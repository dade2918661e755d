//! Persistence of wallet metadata keyed by wallet name.
//!
//! A wallet is fully described by its seed, the name of the backend it talks
//! to and the number of keys to derive on load.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::encryption;
use crate::error::WalletError;
use crate::keys::Seed;

/// Magic string identifying a TFT wallet file.
pub const WALLET_MAGIC: &str = "TFTW";

/// Current wallet file format version.
pub const WALLET_VERSION: u32 = 1;

/// File extension of wallet files.
pub const WALLET_EXTENSION: &str = "wallet";

/// Everything needed to reconstruct a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletData {
    pub name: String,
    pub seed: Seed,
    /// Name of the chain backend (`standard`, `testnet`, `devnet`).
    pub backend: String,
    /// Number of keys derived from the seed.
    pub keys_to_load: u64,
}

/// Storage of [`WalletData`] by name.
///
/// `save` with `create = true` fails with [`WalletError::WalletExists`] if the
/// name is taken; with `create = false` it fails with
/// [`WalletError::WalletNotFound`] if the name is unknown.
pub trait WalletStore: Send + Sync {
    fn exists(&self, name: &str) -> Result<bool, WalletError>;

    fn load(&self, name: &str) -> Result<WalletData, WalletError>;

    fn save(&self, data: &WalletData, create: bool) -> Result<(), WalletError>;
}

/// In-process store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    wallets: RwLock<HashMap<String, WalletData>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.read().is_empty()
    }
}

impl WalletStore for MemoryWalletStore {
    fn exists(&self, name: &str) -> Result<bool, WalletError> {
        Ok(self.wallets.read().contains_key(name))
    }

    fn load(&self, name: &str) -> Result<WalletData, WalletError> {
        self.wallets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WalletError::WalletNotFound(name.to_string()))
    }

    fn save(&self, data: &WalletData, create: bool) -> Result<(), WalletError> {
        let mut wallets = self.wallets.write();
        let present = wallets.contains_key(&data.name);
        if create && present {
            return Err(WalletError::WalletExists(data.name.clone()));
        }
        if !create && !present {
            return Err(WalletError::WalletNotFound(data.name.clone()));
        }
        wallets.insert(data.name.clone(), data.clone());
        Ok(())
    }
}

/// Wallet file header serialized as JSON.
#[derive(Serialize, Deserialize)]
struct WalletFileHeader {
    magic: String,
    version: u32,
}

/// Encrypted part of a wallet file.
#[derive(Serialize, Deserialize)]
struct WalletPayload {
    seed: String,
    backend: String,
    keys_to_load: u64,
}

impl Drop for WalletPayload {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

/// One password-encrypted file per wallet in a directory.
///
/// # File format
/// ```text
/// header_len (4 bytes LE) || header_json || encrypted_payload
/// ```
pub struct FileWalletStore {
    dir: PathBuf,
    password: Zeroizing<Vec<u8>>,
}

impl FileWalletStore {
    pub fn new(dir: impl Into<PathBuf>, password: impl Into<Vec<u8>>) -> Self {
        Self {
            dir: dir.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding wallet `name`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, WalletError> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
        {
            return Err(WalletError::InvalidRequest(format!("invalid wallet name: {name:?}")));
        }
        Ok(self.dir.join(format!("{name}.{WALLET_EXTENSION}")))
    }

    /// Names of all wallets in the directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, WalletError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(WALLET_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn encode(&self, data: &WalletData) -> Result<Vec<u8>, WalletError> {
        let header = WalletFileHeader {
            magic: WALLET_MAGIC.to_string(),
            version: WALLET_VERSION,
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| WalletError::Serialization(e.to_string()))?;

        let payload = WalletPayload {
            seed: hex::encode(data.seed.as_bytes()),
            backend: data.backend.clone(),
            keys_to_load: data.keys_to_load,
        };
        let payload_json = Zeroizing::new(
            serde_json::to_vec(&payload).map_err(|e| WalletError::Serialization(e.to_string()))?,
        );
        let encrypted = encryption::encrypt(&payload_json, &self.password)?;

        let header_len = u32::try_from(header_json.len())
            .map_err(|_| WalletError::Serialization("header too large".into()))?;
        let mut file_data = Vec::with_capacity(4 + header_json.len() + encrypted.len());
        file_data.extend_from_slice(&header_len.to_le_bytes());
        file_data.extend_from_slice(&header_json);
        file_data.extend_from_slice(&encrypted);
        Ok(file_data)
    }

    fn decode(&self, name: &str, file_data: &[u8]) -> Result<WalletData, WalletError> {
        let (len_bytes, rest) = file_data
            .split_first_chunk::<4>()
            .ok_or_else(|| WalletError::CorruptedFile("file too short".into()))?;
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(WalletError::CorruptedFile("header truncated".into()));
        }
        let (header_json, encrypted) = rest.split_at(header_len);

        let header: WalletFileHeader = serde_json::from_slice(header_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid header: {e}")))?;
        if header.magic != WALLET_MAGIC {
            return Err(WalletError::CorruptedFile("invalid magic".into()));
        }
        if header.version != WALLET_VERSION {
            return Err(WalletError::CorruptedFile(format!(
                "unsupported version: {}",
                header.version
            )));
        }

        let payload_json = Zeroizing::new(encryption::decrypt(encrypted, &self.password)?);
        let payload: WalletPayload = serde_json::from_slice(&payload_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid payload: {e}")))?;
        let seed = Seed::from_hex(&payload.seed)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid seed: {e}")))?;

        Ok(WalletData {
            name: name.to_string(),
            seed,
            backend: payload.backend.clone(),
            keys_to_load: payload.keys_to_load,
        })
    }
}

impl WalletStore for FileWalletStore {
    fn exists(&self, name: &str) -> Result<bool, WalletError> {
        Ok(self.path_for(name)?.exists())
    }

    fn load(&self, name: &str) -> Result<WalletData, WalletError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(WalletError::WalletNotFound(name.to_string()));
        }
        let file_data = fs::read(&path)?;
        self.decode(name, &file_data)
    }

    fn save(&self, data: &WalletData, create: bool) -> Result<(), WalletError> {
        let path = self.path_for(&data.name)?;
        let present = path.exists();
        if create && present {
            return Err(WalletError::WalletExists(data.name.clone()));
        }
        if !create && !present {
            return Err(WalletError::WalletNotFound(data.name.clone()));
        }

        fs::create_dir_all(&self.dir)?;
        let file_data = self.encode(data)?;
        let tmp = path.with_extension(format!("{WALLET_EXTENSION}.tmp"));
        fs::write(&tmp, &file_data)?;
        fs::rename(&tmp, &path)?;
        debug!(name = %data.name, path = %path.display(), "saved wallet");
        Ok(())
    }
}
