//! Chain access behind one trait, so the bundler logic can run against a
//! failover RPC pool in production and an in-memory double in tests.

use crate::errors::{BundlerError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use spl_token::solana_program::program_pack::Pack;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ChainConnection: Send + Sync {
    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Raw account data, `None` when the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    async fn get_slot(&self) -> Result<u64>;

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature>;

    /// `true` once the signature reached the configured commitment.
    async fn confirm_transaction(&self, signature: &Signature) -> Result<bool>;

    /// Token amount held by an SPL token account; a missing account holds zero.
    async fn get_token_balance(&self, token_account: &Pubkey) -> Result<u64> {
        match self.get_account_data(token_account).await? {
            Some(data) => {
                let account = spl_token::state::Account::unpack(&data).map_err(|e| {
                    BundlerError::Serialization(format!("Invalid token account {}: {}", token_account, e))
                })?;
                Ok(account.amount)
            }
            None => Ok(0),
        }
    }

    async fn get_address_lookup_table(&self, table: &Pubkey) -> Result<Option<AddressLookupTableAccount>> {
        match self.get_account_data(table).await? {
            Some(data) => {
                let state = AddressLookupTable::deserialize(&data).map_err(|e| {
                    BundlerError::Serialization(format!("Invalid lookup table {}: {}", table, e))
                })?;
                Ok(Some(AddressLookupTableAccount {
                    key: *table,
                    addresses: state.addresses.to_vec(),
                }))
            }
            None => Ok(None),
        }
    }
}

/// Bounded confirmation polling.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmTiming {
    pub window: Duration,
    pub poll: Duration,
}

impl Default for ConfirmTiming {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(6),
            poll: Duration::from_millis(500),
        }
    }
}

/// Polls until `signature` is confirmed or the window runs out.
pub async fn await_confirmation(chain: &dyn ChainConnection, signature: &Signature, timing: ConfirmTiming) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + timing.window;
    loop {
        match chain.confirm_transaction(signature).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => debug!("Confirmation poll for {} failed: {}", signature, e),
        }
        if tokio::time::Instant::now() + timing.poll > deadline {
            return Ok(false);
        }
        tokio::time::sleep(timing.poll).await;
    }
}

/// Sends one transaction and waits for it to confirm.
pub async fn send_and_confirm(
    chain: &dyn ChainConnection,
    transaction: &VersionedTransaction,
    label: &str,
    timing: ConfirmTiming,
) -> Result<Signature> {
    let signature = chain.send_transaction(transaction).await?;
    info!("Sent {} transaction: {}", label, signature);
    if await_confirmation(chain, &signature, timing).await? {
        info!("{} transaction confirmed: {}", label, signature);
        Ok(signature)
    } else {
        Err(BundlerError::Transport(format!(
            "{} transaction {} not confirmed within {:?}",
            label, signature, timing.window
        )))
    }
}

/// Rotating RPC pool. A failed call moves on to the next endpoint, up to
/// `max_attempts` calls in total.
pub struct RpcChainConnection {
    clients: Vec<Arc<RpcClient>>,
    urls: Vec<String>,
    current: AtomicUsize,
    max_attempts: usize,
    commitment: CommitmentConfig,
}

impl RpcChainConnection {
    pub fn new(urls: &[String], commitment: CommitmentConfig, timeout: Duration, max_attempts: usize) -> Result<Self> {
        if urls.is_empty() {
            return Err(BundlerError::Config("At least one RPC URL is required".to_string()));
        }
        let clients = urls
            .iter()
            .map(|url| Arc::new(RpcClient::new_with_timeout_and_commitment(url.clone(), timeout, commitment)))
            .collect();
        Ok(Self {
            clients,
            urls: urls.to_vec(),
            current: AtomicUsize::new(0),
            max_attempts: max_attempts.max(1),
            commitment,
        })
    }

    async fn with_failover<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: Fn(Arc<RpcClient>) -> Fut,
        Fut: Future<Output = std::result::Result<T, ClientError>>,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let idx = self.current.load(Ordering::Relaxed) % self.clients.len();
            match op(self.clients[idx].clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "RPC {} failed on {} (attempt {}/{}): {}",
                        label, self.urls[idx], attempt, self.max_attempts, e
                    );
                    last_error = e.to_string();
                    // Only rotate if nobody else already did.
                    let _ = self.current.compare_exchange(
                        idx,
                        (idx + 1) % self.clients.len(),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    );
                }
            }
        }
        Err(BundlerError::Transport(format!(
            "{} failed after {} attempts: {}",
            label, self.max_attempts, last_error
        )))
    }
}

#[async_trait]
impl ChainConnection for RpcChainConnection {
    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.with_failover("getLatestBlockhash", |c| async move { c.get_latest_blockhash().await })
            .await
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let address = *address;
        let commitment = self.commitment;
        let response = self
            .with_failover("getAccountInfo", |c| async move {
                c.get_account_with_commitment(&address, commitment).await
            })
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let address = *address;
        self.with_failover("getBalance", |c| async move { c.get_balance(&address).await })
            .await
    }

    async fn get_slot(&self) -> Result<u64> {
        self.with_failover("getSlot", |c| async move { c.get_slot().await }).await
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..Default::default()
        };
        let signature = self
            .with_failover("sendTransaction", |c| {
                let config = config.clone();
                async move { c.send_transaction_with_config(transaction, config).await }
            })
            .await?;
        debug!("Sent transaction {}", signature);
        Ok(signature)
    }

    async fn confirm_transaction(&self, signature: &Signature) -> Result<bool> {
        let signature = *signature;
        let commitment = self.commitment;
        let response = self
            .with_failover("getSignatureStatuses", |c| async move {
                c.confirm_transaction_with_commitment(&signature, commitment).await
            })
            .await?;
        Ok(response.value)
    }
}
