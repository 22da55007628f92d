use crate::errors::{BundlerError, Result};
use dotenv::dotenv;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const SETTINGS_FILENAME: &str = "bundler_settings.json";

// Ranked Jito block engines, tried in this order.
pub const JITO_BLOCK_ENGINE_ENDPOINTS: [&str; 3] = [
    "https://amsterdam.mainnet.block-engine.jito.wtf",
    "https://frankfurt.mainnet.block-engine.jito.wtf",
    "https://ny.mainnet.block-engine.jito.wtf",
];

pub const JITO_TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEndpointSettings {
    pub url: String,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Chain connection
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_rpc_max_attempts")]
    pub rpc_max_attempts: usize,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    // Relay
    #[serde(default = "default_relay_endpoints")]
    pub relay_endpoints: Vec<RelayEndpointSettings>,
    #[serde(default = "default_tip_accounts")]
    pub jito_tip_accounts: Vec<String>,
    #[serde(default = "default_jito_tip_lamports")]
    pub jito_tip_lamports: u64,
    /// Falls back to one-by-one sends when every relay fails.
    #[serde(default = "default_true")]
    pub sequential_fallback: bool,
    #[serde(default = "default_fallback_stagger_ms")]
    pub fallback_stagger_ms: u64,
    #[serde(default = "default_individual_retries")]
    pub individual_retries: usize,
    #[serde(default = "default_confirmation_window_ms")]
    pub confirmation_window_ms: u64,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    // Pump.fun
    #[serde(default = "default_ipfs_api_url")]
    pub ipfs_api_url: String,

    // Wallets and records
    #[serde(default)]
    pub main_wallet_private_key: String,
    #[serde(default = "default_wallet_dir")]
    pub wallet_dir: PathBuf,
    #[serde(default = "default_portfolio_path")]
    pub portfolio_path: PathBuf,

    // Transaction shaping
    #[serde(default = "default_priority_fee")]
    pub priority_fee_micro_lamports: u64,
    #[serde(default = "default_max_trades_per_tx")]
    pub max_trades_per_tx: usize,
    #[serde(default = "default_funding_buffer_lamports")]
    pub funding_buffer_lamports: u64,
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    #[serde(default = "default_block_jitter_ms")]
    pub block_jitter_ms: u64,
}

fn default_rpc_urls() -> Vec<String> {
    vec!["https://api.mainnet-beta.solana.com".to_string()]
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_rpc_max_attempts() -> usize {
    4
}
fn default_rpc_timeout_secs() -> u64 {
    30
}
fn default_relay_timeout_ms() -> u64 {
    5_000
}
fn default_relay_endpoints() -> Vec<RelayEndpointSettings> {
    JITO_BLOCK_ENGINE_ENDPOINTS
        .iter()
        .map(|url| RelayEndpointSettings {
            url: url.to_string(),
            timeout_ms: default_relay_timeout_ms(),
        })
        .collect()
}
fn default_tip_accounts() -> Vec<String> {
    JITO_TIP_ACCOUNTS.iter().map(|s| s.to_string()).collect()
}
fn default_jito_tip_lamports() -> u64 {
    1_000_000 // 0.001 SOL
}
fn default_true() -> bool {
    true
}
fn default_fallback_stagger_ms() -> u64 {
    25
}
fn default_individual_retries() -> usize {
    3
}
fn default_confirmation_window_ms() -> u64 {
    6_000
}
fn default_confirmation_poll_ms() -> u64 {
    500
}
fn default_ipfs_api_url() -> String {
    "https://pump.fun/api/ipfs".to_string()
}
fn default_wallet_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pumpfun-bundler")
        .join("wallets")
}
fn default_portfolio_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pumpfun-bundler")
        .join("portfolio.json")
}
fn default_priority_fee() -> u64 {
    500_000
}
fn default_max_trades_per_tx() -> usize {
    6
}
fn default_funding_buffer_lamports() -> u64 {
    3_000_000 // ATA rent + fees
}
fn default_block_interval_ms() -> u64 {
    400
}
fn default_block_jitter_ms() -> u64 {
    150
}

impl Default for Settings {
    fn default() -> Self {
        // Every field carries a serde default, so an empty object is a full config.
        serde_json::from_str("{}").unwrap_or_else(|_| unreachable!("all settings fields have defaults"))
    }
}

impl Settings {
    /// Loads settings from `path` (or `bundler_settings.json`), then applies `.env`
    /// and environment overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILENAME));

        let mut settings = if path.exists() {
            info!("Loading settings from {}", path.display());
            let raw = fs::read_to_string(&path)
                .map_err(|e| BundlerError::Config(format!("Failed to read '{}': {}", path.display(), e)))?;
            serde_json::from_str::<Settings>(&raw)
                .map_err(|e| BundlerError::Config(format!("Failed to parse '{}': {}", path.display(), e)))?
        } else {
            warn!("Settings file {} not found, using defaults.", path.display());
            Settings::default()
        };

        if let Ok(urls) = std::env::var("BUNDLER_RPC_URLS") {
            let urls: Vec<String> = urls
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !urls.is_empty() {
                settings.rpc_urls = urls;
            }
        }
        if let Ok(key) = std::env::var("BUNDLER_MAIN_WALLET") {
            settings.main_wallet_private_key = key;
        }

        settings.validate()?;
        debug!(
            "Settings loaded: {} rpc url(s), {} relay endpoint(s), commitment {}",
            settings.rpc_urls.len(),
            settings.relay_endpoints.len(),
            settings.commitment
        );
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .map_err(|e| BundlerError::Config(format!("Failed to write '{}': {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_urls.is_empty() {
            return Err(BundlerError::Config("At least one RPC url is required".to_string()));
        }
        for endpoint in &self.relay_endpoints {
            Url::parse(&endpoint.url).map_err(|e| {
                BundlerError::Config(format!("Invalid relay endpoint '{}': {}", endpoint.url, e))
            })?;
        }
        if self.max_trades_per_tx == 0 {
            return Err(BundlerError::Config("max_trades_per_tx must be at least 1".to_string()));
        }
        self.tip_accounts()?;
        self.commitment_config()?;
        Ok(())
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig> {
        match self.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(BundlerError::Config(format!("Invalid commitment level: {}", other))),
        }
    }

    pub fn tip_accounts(&self) -> Result<Vec<Pubkey>> {
        if self.jito_tip_accounts.is_empty() {
            return Err(BundlerError::Config("No Jito tip accounts configured".to_string()));
        }
        self.jito_tip_accounts
            .iter()
            .map(|s| {
                Pubkey::from_str(s)
                    .map_err(|e| BundlerError::Config(format!("Invalid tip account '{}': {}", s, e)))
            })
            .collect()
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_a_complete_config() {
        let settings = Settings::default();
        assert_eq!(settings.relay_endpoints.len(), 3);
        assert_eq!(settings.relay_endpoints[0].url, JITO_BLOCK_ENGINE_ENDPOINTS[0]);
        assert_eq!(settings.max_trades_per_tx, 6);
        assert!(settings.sequential_fallback);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_bad_commitment_and_relay_url() {
        let mut settings = Settings::default();
        settings.commitment = "eventually".to_string();
        assert!(matches!(settings.validate(), Err(BundlerError::Config(_))));

        let mut settings = Settings::default();
        settings.relay_endpoints[1].url = "not a url".to_string();
        assert!(matches!(settings.validate(), Err(BundlerError::Config(_))));
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "rpc_urls": ["http://localhost:8899"], "jito_tip_lamports": 42 }"#).unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.jito_tip_lamports, 42);
        assert_eq!(settings.individual_retries, 3);
    }
}
