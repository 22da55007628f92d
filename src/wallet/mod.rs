use crate::errors::{BundlerError, Result};
use crate::models::wallet::{Wallet, WalletInfo, WalletKeys, WalletRole};
use chrono::Utc;
use log::{debug, info};
use solana_sdk::signature::{Keypair, SeedDerivable, Signer};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Decodes a base58 private key, either a 32-byte seed or a 64-byte keypair.
pub fn keypair_from_base58(private_key_base58: &str) -> Result<Keypair> {
    let decoded = bs58::decode(private_key_base58.trim())
        .into_vec()
        .map_err(|e| BundlerError::Wallet(format!("Failed to decode base58 private key: {}", e)))?;

    match decoded.len() {
        32 => {
            let seed: [u8; 32] = decoded
                .try_into()
                .map_err(|_| BundlerError::Wallet("Seed is not 32 bytes long".to_string()))?;
            Keypair::from_seed(&seed)
                .map_err(|e| BundlerError::Wallet(format!("Failed to create keypair from 32-byte seed: {}", e)))
        }
        64 => Keypair::from_bytes(&decoded)
            .map_err(|e| BundlerError::Wallet(format!("Failed to create keypair from 64-byte array: {}", e))),
        other => Err(BundlerError::Wallet(format!(
            "Decoded private key has unexpected length: {}. Expected 32 or 64 bytes.",
            other
        ))),
    }
}

/// The funding and creating identity, built from the configured key.
pub fn main_wallet_from_base58(private_key_base58: &str) -> Result<Wallet> {
    if private_key_base58.trim().is_empty() {
        return Err(BundlerError::Config(
            "main_wallet_private_key is empty; set it in the settings file or BUNDLER_MAIN_WALLET".to_string(),
        ));
    }
    let keypair = keypair_from_base58(private_key_base58)?;
    Ok(Wallet::new("main", WalletRole::Main, keypair))
}

/// Path for a fresh per-launch wallet file inside `dir`.
pub fn launch_wallet_path(dir: &Path) -> PathBuf {
    dir.join(format!("wallets_{}.json", Utc::now().format("%Y%m%d_%H%M%S_%3f")))
}

pub fn read_wallet_file(path: &Path) -> Result<WalletKeys> {
    let file = File::open(path)
        .map_err(|e| BundlerError::Wallet(format!("Failed to open keys file '{}': {}", path.display(), e)))?;
    let keys: WalletKeys = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| BundlerError::Wallet(format!("Failed to parse keys file '{}': {}", path.display(), e)))?;
    Ok(keys)
}

fn entry_to_wallet(index: usize, entry: &WalletInfo) -> Result<Wallet> {
    let keypair = keypair_from_base58(&entry.private_key)?;
    if keypair.pubkey().to_string() != entry.public_key {
        return Err(BundlerError::Wallet(format!(
            "Entry {} public key {} does not match its private key",
            index, entry.public_key
        )));
    }
    let name = entry.name.clone().unwrap_or_else(|| format!("bundler-{}", index + 1));
    Ok(Wallet::new(name, WalletRole::Bundler, keypair))
}

/// Ephemeral bundler wallets of one launch, persisted to a single file.
///
/// Every generated keypair is on disk before `generate` hands it out, so a
/// crash mid-launch never loses funded keys.
#[derive(Debug)]
pub struct KeypairPool {
    path: PathBuf,
    entries: Vec<WalletInfo>,
    /// Set when the pool was opened from its file, so generation may append to it.
    opened: bool,
}

impl KeypairPool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            opened: false,
        }
    }

    /// Opens an existing wallet file, keeping its entries so later generations append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let keys = read_wallet_file(&path)?;
        Ok(Self {
            path,
            entries: keys.wallets,
            opened: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generate(&mut self, count: usize) -> Result<Vec<Wallet>> {
        if count == 0 {
            return Err(BundlerError::Config("wallet count must be greater than zero".to_string()));
        }
        if !self.opened && self.entries.is_empty() && self.path.exists() {
            return Err(BundlerError::Config(format!(
                "wallet file {} already exists; open it instead of overwriting its keys",
                self.path.display()
            )));
        }
        let start = self.entries.len();
        let wallets: Vec<Wallet> = (0..count)
            .map(|i| Wallet::new(format!("bundler-{}", start + i + 1), WalletRole::Bundler, Keypair::new()))
            .collect();

        let mut entries = self.entries.clone();
        entries.extend(wallets.iter().map(Wallet::to_entry));
        self.persist(&entries)?;
        self.entries = entries;

        info!("Generated {} wallets into {}", count, self.path.display());
        Ok(wallets)
    }

    pub fn load(&self) -> Result<Vec<Wallet>> {
        let keys = read_wallet_file(&self.path)?;
        keys.wallets
            .iter()
            .enumerate()
            .map(|(i, entry)| entry_to_wallet(i, entry))
            .collect()
    }

    fn persist(&self, entries: &[WalletInfo]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let keys = WalletKeys {
            wallets: entries.to_vec(),
        };
        let json = serde_json::to_string_pretty(&keys)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} wallet entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_wallets_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launch.json");
        let mut pool = KeypairPool::new(&path);

        let generated = pool.generate(3).unwrap();
        assert!(path.exists());
        let loaded = pool.load().unwrap();
        assert_eq!(loaded.len(), 3);
        for (a, b) in generated.iter().zip(loaded.iter()) {
            assert_eq!(a.pubkey(), b.pubkey());
            assert_eq!(a.keypair().to_bytes(), b.keypair().to_bytes());
        }

        pool.generate(2).unwrap();
        let reopened = KeypairPool::open(&path).unwrap();
        assert_eq!(reopened.len(), 5);
        assert_eq!(reopened.load().unwrap()[0].pubkey(), generated[0].pubkey());
    }

    #[test]
    fn zero_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut pool = KeypairPool::new(dir.path().join("w.json"));
        assert!(matches!(pool.generate(0), Err(BundlerError::Config(_))));
    }

    #[test]
    fn unwritable_path_returns_no_wallets() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let mut pool = KeypairPool::new(blocker.join("w.json"));
        assert!(pool.generate(2).is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn fresh_pool_never_overwrites_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launch.json");
        let first = KeypairPool::new(&path).generate(3).unwrap();

        let mut second = KeypairPool::new(&path);
        assert!(matches!(second.generate(2), Err(BundlerError::Config(_))));
        assert!(second.is_empty());

        let kept = KeypairPool::open(&path).unwrap().load().unwrap();
        let kept: Vec<_> = kept.iter().map(|w| w.pubkey()).collect();
        let first: Vec<_> = first.iter().map(|w| w.pubkey()).collect();
        assert_eq!(kept, first);
    }

    #[test]
    fn decodes_seed_and_full_keypair() {
        let kp = Keypair::new();
        let full = bs58::encode(kp.to_bytes()).into_string();
        assert_eq!(keypair_from_base58(&full).unwrap().pubkey(), kp.pubkey());

        let seed = bs58::encode(&kp.to_bytes()[..32]).into_string();
        assert_eq!(keypair_from_base58(&seed).unwrap().pubkey(), kp.pubkey());

        let short = bs58::encode([1u8; 10]).into_string();
        assert!(keypair_from_base58(&short).is_err());
        assert!(main_wallet_from_base58("  ").is_err());
    }
}
