//! In-memory chain, relay, uploader and portfolio doubles. Compiled for unit
//! tests and, through the `test-utils` feature, for the integration tests.

use crate::api::jito::{BundleRelay, BundleStatus};
use crate::api::pumpfun::MetadataUploader;
use crate::chain::ChainConnection;
use crate::errors::{BundlerError, Result};
use crate::models::token::TokenMetadata;
use crate::portfolio::{PortfolioRecorder, TradeRecord};
use crate::pump_instruction_builders::{BondingCurveAccount, GlobalState, GLOBAL_STATE_PUBKEY};
use async_trait::async_trait;
use borsh::BorshSerialize;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mainnet-shaped global state with fresh authority and fee recipient keys.
pub fn global_state() -> GlobalState {
    GlobalState {
        initialized: 1,
        authority: Pubkey::new_unique(),
        fee_recipient: Pubkey::new_unique(),
        initial_virtual_token_reserves: 1_073_000_000_000_000,
        initial_virtual_sol_reserves: 30_000_000_000,
        initial_real_token_reserves: 793_100_000_000_000,
        token_total_supply: 1_000_000_000_000_000,
        fee_basis_points: 100,
    }
}

fn anchor_data<T: BorshSerialize>(value: &T) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    value.serialize(&mut data).unwrap();
    data
}

/// Chain double. Sends land unless their fee payer or send index is listed;
/// unknown accounts read as `fallback`.
#[derive(Default)]
pub struct MockChain {
    pub accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    pub fallback: Mutex<Option<Vec<u8>>>,
    pub balances: Mutex<HashMap<Pubkey, u64>>,
    pub token_balances: Mutex<HashMap<Pubkey, u64>>,
    pub sent: Mutex<Vec<VersionedTransaction>>,
    /// Fee payers whose sends are rejected.
    pub reject_payers: Mutex<HashSet<Pubkey>>,
    /// Zero-based send attempts that are rejected.
    pub reject_sends: Mutex<HashSet<usize>>,
    pub attempts: AtomicUsize,
    pub slot: AtomicU64,
    pub unconfirmed: AtomicBool,
}

impl MockChain {
    pub fn with_global_state() -> Self {
        let chain = Self::default();
        chain
            .accounts
            .lock()
            .unwrap()
            .insert(GLOBAL_STATE_PUBKEY, anchor_data(&global_state()));
        chain
    }

    /// Serves `curve` for every account not set explicitly.
    pub fn with_curve(self, curve: &BondingCurveAccount) -> Self {
        *self.fallback.lock().unwrap() = Some(curve.to_account_data().unwrap());
        self
    }

    pub fn rejecting_sends(self, attempts: &[usize]) -> Self {
        self.reject_sends.lock().unwrap().extend(attempts.iter().copied());
        self
    }

    pub fn fund(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainConnection for MockChain {
    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.accounts.lock().unwrap().get(address) {
            return Ok(Some(data.clone()));
        }
        Ok(self.fallback.lock().unwrap().clone())
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn get_slot(&self) -> Result<u64> {
        Ok(self.slot.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject_sends.lock().unwrap().contains(&attempt) {
            return Err(BundlerError::Transport(format!("send {} rejected", attempt)));
        }
        let payer = transaction.message.static_account_keys()[0];
        if self.reject_payers.lock().unwrap().contains(&payer) {
            return Err(BundlerError::Transport(format!("send rejected for {}", payer)));
        }
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn confirm_transaction(&self, _signature: &Signature) -> Result<bool> {
        Ok(!self.unconfirmed.load(Ordering::SeqCst))
    }

    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64> {
        Ok(self.token_balances.lock().unwrap().get(token_account).copied().unwrap_or(0))
    }
}

/// Relay double. Urls listed in `failing` reject every call; the others accept
/// and report `status`.
#[derive(Default)]
pub struct MockRelay {
    pub failing: HashSet<String>,
    pub status: Option<BundleStatus>,
    pub status_unavailable: bool,
    pub calls: Mutex<Vec<(String, usize)>>,
    /// Set on every accepted bundle.
    pub trips: Mutex<Option<Arc<AtomicBool>>>,
}

impl MockRelay {
    pub fn accepting() -> Self {
        Self {
            status: Some(BundleStatus::Landed { slot: 1 }),
            ..Self::default()
        }
    }

    pub fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::accepting()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Sizes of the bundles that were accepted.
    pub fn bundle_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| !self.failing.contains(url))
            .map(|(_, n)| *n)
            .collect()
    }
}

#[async_trait]
impl BundleRelay for MockRelay {
    async fn send_bundle(&self, url: &str, encoded_transactions: &[String], _timeout: Duration) -> Result<String> {
        self.calls.lock().unwrap().push((url.to_string(), encoded_transactions.len()));
        if self.failing.contains(url) {
            return Err(BundlerError::Relay(format!("{} unavailable", url)));
        }
        if let Some(flag) = self.trips.lock().unwrap().as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(format!("bundle-{}", self.call_count()))
    }

    async fn bundle_status(&self, url: &str, _bundle_id: &str, _timeout: Duration) -> Result<BundleStatus> {
        if self.status_unavailable || self.failing.contains(url) {
            return Err(BundlerError::Relay("status api unavailable".to_string()));
        }
        Ok(self.status.clone().unwrap_or(BundleStatus::Pending))
    }
}

#[derive(Default)]
pub struct MockUploader {
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl MetadataUploader for MockUploader {
    async fn upload(&self, metadata: &TokenMetadata) -> Result<String> {
        self.uploads.lock().unwrap().push(metadata.name.clone());
        Ok(format!("https://ipfs.test/{}", metadata.symbol))
    }
}

#[derive(Default)]
pub struct MockPortfolio {
    pub buys: Mutex<Vec<TradeRecord>>,
    pub sells: Mutex<Vec<TradeRecord>>,
}

#[async_trait]
impl PortfolioRecorder for MockPortfolio {
    async fn record_buy(&self, record: TradeRecord) -> Result<()> {
        self.buys.lock().unwrap().push(record);
        Ok(())
    }

    async fn record_sell(&self, record: TradeRecord) -> Result<()> {
        self.sells.lock().unwrap().push(record);
        Ok(())
    }
}
