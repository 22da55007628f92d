use crate::api::jito::{BundleRelay, BundleStatus};
use crate::bundler::builder::{transaction_size, MAX_TRANSACTION_SIZE};
use crate::chain::{await_confirmation, ChainConnection, ConfirmTiming};
use crate::config::{Settings, JITO_BLOCK_ENGINE_ENDPOINTS};
use crate::errors::{BundlerError, Result};
use crate::models::result::{Confirmation, SubmissionPath, TransactionResult};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MAX_BUNDLE_TRANSACTIONS: usize = 5;
const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STAGGER: Duration = Duration::from_millis(25);
const RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStrategy {
    Relay { url: String, timeout: Duration },
    /// Individual sends outside any bundle, `stagger` apart.
    Sequential { stagger: Duration },
}

/// Ordered submission strategies, tried first to last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    strategies: Vec<SubmissionStrategy>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        let mut strategies: Vec<SubmissionStrategy> = JITO_BLOCK_ENGINE_ENDPOINTS
            .iter()
            .map(|url| SubmissionStrategy::Relay {
                url: url.to_string(),
                timeout: DEFAULT_RELAY_TIMEOUT,
            })
            .collect();
        strategies.push(SubmissionStrategy::Sequential {
            stagger: DEFAULT_STAGGER,
        });
        Self { strategies }
    }
}

impl FallbackPolicy {
    pub fn new(strategies: Vec<SubmissionStrategy>) -> Self {
        Self { strategies }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut strategies: Vec<SubmissionStrategy> = settings
            .relay_endpoints
            .iter()
            .map(|endpoint| SubmissionStrategy::Relay {
                url: endpoint.url.clone(),
                timeout: Duration::from_millis(endpoint.timeout_ms),
            })
            .collect();
        if settings.sequential_fallback {
            strategies.push(SubmissionStrategy::Sequential {
                stagger: Duration::from_millis(settings.fallback_stagger_ms),
            });
        }
        Self { strategies }
    }

    pub fn strategies(&self) -> &[SubmissionStrategy] {
        &self.strategies
    }

    fn relays(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.strategies.iter().filter_map(|s| match s {
            SubmissionStrategy::Relay { url, timeout } => Some((url.as_str(), *timeout)),
            SubmissionStrategy::Sequential { .. } => None,
        })
    }

    fn sequential_stagger(&self) -> Option<Duration> {
        self.strategies.iter().find_map(|s| match s {
            SubmissionStrategy::Sequential { stagger } => Some(*stagger),
            SubmissionStrategy::Relay { .. } => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AcceptedBundle {
    pub bundle_id: String,
    pub endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleLanding {
    Landed(Confirmation),
    Failed(String),
    NotLanded,
}

/// Per-transaction outcome of a dispatch.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub signature: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub path: SubmissionPath,
    pub confirmation: Confirmation,
    pub confirmation_ms: Option<u64>,
}

impl TxOutcome {
    fn failed(signature: Option<String>, path: SubmissionPath, error: String) -> Self {
        Self {
            signature,
            success: false,
            error: Some(error),
            path,
            confirmation: Confirmation::Unconfirmed,
            confirmation_ms: None,
        }
    }

    /// Outcome for a transaction that never reached the chain.
    pub fn not_submitted(transaction: &VersionedTransaction, error: impl Into<String>) -> Self {
        Self::failed(first_signature(transaction), SubmissionPath::NotSubmitted, error.into())
    }

    pub fn into_result(self, wallet: Option<String>) -> TransactionResult {
        TransactionResult {
            wallet,
            success: self.success,
            signature: self.signature,
            error: self.error,
            timestamp: Utc::now(),
            confirmation_ms: self.confirmation_ms,
            path: self.path,
            confirmation: self.confirmation,
            lamports: 0,
            token_amount: 0,
        }
    }
}

fn first_signature(tx: &VersionedTransaction) -> Option<String> {
    tx.signatures.first().map(Signature::to_string)
}

/// Base64 wire encoding of a bundle, checked against the bundle and size limits.
pub fn encode_bundle(transactions: &[VersionedTransaction]) -> Result<Vec<String>> {
    if transactions.is_empty() {
        return Err(BundlerError::Build("cannot send an empty bundle".to_string()));
    }
    if transactions.len() > MAX_BUNDLE_TRANSACTIONS {
        return Err(BundlerError::Build(format!(
            "bundle has {} transactions, max {}",
            transactions.len(),
            MAX_BUNDLE_TRANSACTIONS
        )));
    }
    transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| {
            let size = transaction_size(tx)?;
            if size > MAX_TRANSACTION_SIZE {
                error!("Transaction #{} exceeds max size ({} bytes > {} bytes)", i, size, MAX_TRANSACTION_SIZE);
                return Err(BundlerError::Build(format!("transaction #{} is {} bytes", i, size)));
            }
            Ok(BASE64_STANDARD.encode(bincode::serialize(tx)?))
        })
        .collect()
}

pub struct RelaySubmitter {
    chain: Arc<dyn ChainConnection>,
    relay: Arc<dyn BundleRelay>,
    policy: FallbackPolicy,
    timing: ConfirmTiming,
    individual_retries: usize,
}

impl RelaySubmitter {
    pub fn new(
        chain: Arc<dyn ChainConnection>,
        relay: Arc<dyn BundleRelay>,
        policy: FallbackPolicy,
        timing: ConfirmTiming,
        individual_retries: usize,
    ) -> Self {
        Self {
            chain,
            relay,
            policy,
            timing,
            individual_retries,
        }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Tries every relay in policy order; the first acceptance wins.
    pub async fn submit_atomic(&self, transactions: &[VersionedTransaction]) -> Result<AcceptedBundle> {
        let encoded = encode_bundle(transactions)?;
        let mut failures = Vec::new();
        for (url, timeout) in self.policy.relays() {
            let attempt = tokio::time::timeout(timeout, self.relay.send_bundle(url, &encoded, timeout)).await;
            match attempt {
                Ok(Ok(bundle_id)) => {
                    info!("Bundle of {} transactions accepted by {}: {}", transactions.len(), url, bundle_id);
                    return Ok(AcceptedBundle {
                        bundle_id,
                        endpoint: url.to_string(),
                        timeout,
                    });
                }
                Ok(Err(e)) => {
                    warn!("Relay {} rejected bundle: {}", url, e);
                    failures.push(format!("{}: {}", url, e));
                }
                Err(_) => {
                    warn!("Relay {} timed out after {:?}", url, timeout);
                    failures.push(format!("{}: timed out", url));
                }
            }
        }
        Err(BundlerError::AllRelaysExhausted(failures.join("; ")))
    }

    /// `sendTransaction` with bounded retries on transient errors.
    pub async fn submit_individual(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        let mut last_error = None;
        for attempt in 0..=self.individual_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
            }
            match self.chain.send_transaction(transaction).await {
                Ok(signature) => return Ok(signature),
                Err(e) if e.is_retryable() => {
                    debug!("Send attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| BundlerError::Transport("send failed".to_string())))
    }

    /// Polls the accepting relay for the bundle's status inside the confirmation
    /// window. When the status API never answers, the bundle is assumed landed at
    /// window expiry and marked `Probabilistic`.
    pub async fn await_bundle(&self, bundle: &AcceptedBundle) -> BundleLanding {
        let deadline = tokio::time::Instant::now() + self.timing.window;
        let mut status_seen = false;
        loop {
            match self
                .relay
                .bundle_status(&bundle.endpoint, &bundle.bundle_id, bundle.timeout)
                .await
            {
                Ok(BundleStatus::Landed { slot }) => {
                    info!("Bundle {} landed in slot {}", bundle.bundle_id, slot);
                    return BundleLanding::Landed(Confirmation::Confirmed);
                }
                Ok(BundleStatus::Failed(reason)) => {
                    warn!("Bundle {} failed: {}", bundle.bundle_id, reason);
                    return BundleLanding::Failed(reason);
                }
                Ok(BundleStatus::Pending) => status_seen = true,
                Err(e) => debug!("Bundle status for {} unavailable: {}", bundle.bundle_id, e),
            }
            if tokio::time::Instant::now() + self.timing.poll > deadline {
                break;
            }
            tokio::time::sleep(self.timing.poll).await;
        }
        if status_seen {
            warn!("Bundle {} not landed within {:?}", bundle.bundle_id, self.timing.window);
            BundleLanding::NotLanded
        } else {
            warn!(
                "No status for bundle {} within {:?}; assuming it landed",
                bundle.bundle_id, self.timing.window
            );
            BundleLanding::Landed(Confirmation::Probabilistic)
        }
    }

    pub async fn await_signature(&self, signature: &Signature) -> Result<bool> {
        await_confirmation(self.chain.as_ref(), signature, self.timing).await
    }

    /// Sends one transaction and waits for it; never errors, the outcome says what happened.
    pub async fn send_one(&self, transaction: &VersionedTransaction, path: SubmissionPath) -> TxOutcome {
        let started = Instant::now();
        let signature = match self.submit_individual(transaction).await {
            Ok(sig) => sig,
            Err(e) => return TxOutcome::failed(first_signature(transaction), path, e.to_string()),
        };
        match self.await_signature(&signature).await {
            Ok(true) => TxOutcome {
                signature: Some(signature.to_string()),
                success: true,
                error: None,
                path,
                confirmation: Confirmation::Confirmed,
                confirmation_ms: Some(started.elapsed().as_millis() as u64),
            },
            Ok(false) => TxOutcome::failed(
                Some(signature.to_string()),
                path,
                format!("not confirmed within {:?}", self.timing.window),
            ),
            Err(e) => TxOutcome::failed(Some(signature.to_string()), path, e.to_string()),
        }
    }

    /// One group of member transactions. With a tip the group goes as one bundle
    /// `[tip, members..]`; if that bundle is refused or does not land, every member
    /// is resent individually. Without a tip the members go individually and
    /// concurrently. One outcome per member, in order.
    pub async fn submit_group(
        &self,
        tip: Option<&VersionedTransaction>,
        members: &[VersionedTransaction],
    ) -> Vec<TxOutcome> {
        if let Some(tip) = tip {
            let started = Instant::now();
            let mut bundle = Vec::with_capacity(members.len() + 1);
            bundle.push(tip.clone());
            bundle.extend(members.iter().cloned());
            match self.submit_atomic(&bundle).await {
                Ok(accepted) => match self.await_bundle(&accepted).await {
                    BundleLanding::Landed(confirmation) => {
                        let elapsed = started.elapsed().as_millis() as u64;
                        return members
                            .iter()
                            .map(|tx| TxOutcome {
                                signature: first_signature(tx),
                                success: true,
                                error: None,
                                path: SubmissionPath::AtomicBundle {
                                    bundle_id: accepted.bundle_id.clone(),
                                },
                                confirmation,
                                confirmation_ms: Some(elapsed),
                            })
                            .collect();
                    }
                    other => warn!(
                        "Group bundle {} ended {:?}; sending {} members individually",
                        accepted.bundle_id,
                        other,
                        members.len()
                    ),
                },
                Err(e) => warn!("Group bundle refused ({}); sending {} members individually", e, members.len()),
            }
        }

        join_all(members.iter().map(|tx| self.send_one(tx, SubmissionPath::Individual))).await
    }

    /// Individual sends `stagger` apart, confirmed concurrently. With `confirm_first`
    /// the first transaction must confirm before the rest go out.
    pub async fn submit_sequential(
        &self,
        transactions: &[VersionedTransaction],
        stagger: Duration,
        confirm_first: bool,
    ) -> Vec<TxOutcome> {
        let path = SubmissionPath::SequentialFallback;
        let mut outcomes = Vec::with_capacity(transactions.len());
        let mut rest = transactions;

        if confirm_first && !transactions.is_empty() {
            let first = self.send_one(&transactions[0], path.clone()).await;
            let landed = first.success;
            outcomes.push(first);
            rest = &transactions[1..];
            if !landed {
                outcomes.extend(rest.iter().map(|tx| {
                    TxOutcome::failed(first_signature(tx), path.clone(), "prerequisite transaction failed".to_string())
                }));
                return outcomes;
            }
        }

        let mut pending = Vec::with_capacity(rest.len());
        for (i, tx) in rest.iter().enumerate() {
            if i > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            let started = Instant::now();
            pending.push((started, self.submit_individual(tx).await, tx));
        }

        let confirmations = join_all(pending.into_iter().map(|(started, sent, tx)| {
            let path = path.clone();
            async move {
                match sent {
                    Err(e) => TxOutcome::failed(first_signature(tx), path, e.to_string()),
                    Ok(sig) => match self.await_signature(&sig).await {
                        Ok(true) => TxOutcome {
                            signature: Some(sig.to_string()),
                            success: true,
                            error: None,
                            path,
                            confirmation: Confirmation::Confirmed,
                            confirmation_ms: Some(started.elapsed().as_millis() as u64),
                        },
                        Ok(false) => TxOutcome::failed(Some(sig.to_string()), path, "not confirmed".to_string()),
                        Err(e) => TxOutcome::failed(Some(sig.to_string()), path, e.to_string()),
                    },
                }
            }
        }))
        .await;
        outcomes.extend(confirmations);
        outcomes
    }

    /// Atomic first, then the policy's sequential strategy. Returns one outcome per
    /// transaction after the first `skip_leading` (tips are never resent alone).
    pub async fn dispatch(
        &self,
        transactions: &[VersionedTransaction],
        skip_leading: usize,
        confirm_first: bool,
    ) -> Result<Vec<TxOutcome>> {
        let payload = &transactions[skip_leading.min(transactions.len())..];
        let started = Instant::now();

        let reason = match self.submit_atomic(transactions).await {
            Ok(bundle) => match self.await_bundle(&bundle).await {
                BundleLanding::Landed(confirmation) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    return Ok(payload
                        .iter()
                        .map(|tx| TxOutcome {
                            signature: first_signature(tx),
                            success: true,
                            error: None,
                            path: SubmissionPath::AtomicBundle {
                                bundle_id: bundle.bundle_id.clone(),
                            },
                            confirmation,
                            confirmation_ms: Some(elapsed),
                        })
                        .collect());
                }
                BundleLanding::Failed(reason) => format!("bundle {} failed: {}", bundle.bundle_id, reason),
                BundleLanding::NotLanded => format!("bundle {} did not land", bundle.bundle_id),
            },
            Err(BundlerError::AllRelaysExhausted(detail)) => detail,
            Err(e) => return Err(e),
        };

        let stagger = match self.policy.sequential_stagger() {
            Some(stagger) => stagger,
            None => return Err(BundlerError::AllRelaysExhausted(reason)),
        };
        warn!(
            "DEGRADED ({}): sending {} transactions sequentially, outside any bundle and exposed to MEV",
            reason,
            payload.len()
        );
        Ok(self.submit_sequential(payload, stagger, confirm_first).await)
    }
}
