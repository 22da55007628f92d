use crate::api::jito::BundleRelay;
use crate::bundler::builder::{BuilderConfig, PreparedTrade, TransactionBuilder};
use crate::bundler::relay::{FallbackPolicy, RelaySubmitter, TxOutcome};
use crate::bundler::OrchestratorConfig;
use crate::chain::ChainConnection;
use crate::errors::{BundlerError, Result};
use crate::models::result::{SellResult, SubmissionPath, TransactionResult};
use crate::models::strategy::{GroupPath, LaunchMode, SellMode};
use crate::models::wallet::Wallet;
use crate::portfolio::{PortfolioRecorder, TradeRecord, TradeSide};
use futures::future::join_all;
use log::{error, info, warn};
use rand::Rng;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SellRequest {
    pub mint: Pubkey,
    /// Share of each wallet's balance to sell, 1..=100.
    pub percent: u8,
    pub mode: SellMode,
    pub slippage_bps: u64,
    pub launch_mode: LaunchMode,
}

/// Sells a token out of many wallets at once.
pub struct Seller {
    chain: Arc<dyn ChainConnection>,
    relay: Arc<dyn BundleRelay>,
    portfolio: Arc<dyn PortfolioRecorder>,
    policy: FallbackPolicy,
    config: OrchestratorConfig,
    kill_switch: Arc<AtomicBool>,
}

/// Token amount to sell out of `balance` at `percent`.
pub fn sell_amount(balance: u64, percent: u8) -> u64 {
    (balance as u128 * percent.min(100) as u128 / 100) as u64
}

impl Seller {
    pub fn new(
        chain: Arc<dyn ChainConnection>,
        relay: Arc<dyn BundleRelay>,
        portfolio: Arc<dyn PortfolioRecorder>,
        policy: FallbackPolicy,
        config: OrchestratorConfig,
        kill_switch: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chain,
            relay,
            portfolio,
            policy,
            config,
            kill_switch,
        }
    }

    /// One entry per wallet in the result, in wallet order. Wallets with nothing
    /// to sell or whose sell cannot be built are reported as failures.
    pub async fn sell<R: Rng + Send + ?Sized>(
        &self,
        request: &SellRequest,
        wallets: &[Wallet],
        rng: &mut R,
    ) -> Result<SellResult> {
        if request.percent == 0 || request.percent > 100 {
            return Err(BundlerError::Config(format!(
                "sell percentage must be within 1..=100, got {}",
                request.percent
            )));
        }
        if wallets.is_empty() {
            return Err(BundlerError::Config("no wallets to sell from".to_string()));
        }
        let mint = request.mint;
        let builder = TransactionBuilder::new(
            self.chain.clone(),
            BuilderConfig {
                priority_fee_micro_lamports: self.config.priority_fee_micro_lamports,
                max_trades_per_tx: self.config.max_trades_per_tx,
                launch_mode: request.launch_mode,
            },
        );

        let mut results: Vec<Option<TransactionResult>> = vec![None; wallets.len()];
        let mut trades: Vec<(usize, PreparedTrade)> = Vec::new();
        for (i, wallet) in wallets.iter().enumerate() {
            let label = Some(wallet.pubkey().to_string());
            let ata = get_associated_token_address(&wallet.pubkey(), &mint);
            let balance = match self.chain.get_token_balance(&ata).await {
                Ok(balance) => balance,
                Err(e) => {
                    results[i] = Some(TransactionResult::failure(label, SubmissionPath::NotSubmitted, e.to_string()));
                    continue;
                }
            };
            let amount = sell_amount(balance, request.percent);
            if amount == 0 {
                results[i] = Some(TransactionResult::failure(
                    label,
                    SubmissionPath::NotSubmitted,
                    "no tokens to sell",
                ));
                continue;
            }
            match builder.build_sell(&mint, amount, request.slippage_bps, wallet).await {
                Ok(trade) => trades.push((i, trade)),
                Err(e) => {
                    warn!("Cannot build sell for {}: {}", wallet.name, e);
                    results[i] = Some(
                        TransactionResult::failure(label, SubmissionPath::NotSubmitted, e.to_string())
                            .with_amounts(0, amount),
                    )
                }
            }
        }

        if self.kill_switch.load(Ordering::SeqCst) {
            warn!("Kill switch set, aborting before sell submission");
            return Err(BundlerError::Aborted("sell submission".to_string()));
        }

        info!(
            "Selling {}% of {} from {} wallets ({:?}, {} sells built)",
            request.percent,
            mint,
            wallets.len(),
            request.mode,
            trades.len()
        );
        let submitter = RelaySubmitter::new(
            self.chain.clone(),
            self.relay.clone(),
            self.policy.clone(),
            self.config.confirm,
            self.config.individual_retries,
        );
        let blockhash = self.chain.get_latest_blockhash().await?;

        for group in trades.chunks(request.mode.group_size()) {
            let mut txs = Vec::with_capacity(group.len());
            for (_, trade) in group {
                txs.push(builder.sign_single(trade, None, blockhash)?);
            }
            let outcomes: Vec<TxOutcome> = match request.mode.path() {
                GroupPath::AtomicBundle => {
                    let payer = &group[0].1.wallet;
                    let tip = builder.build_tip(payer, self.config.tip_lamports, &self.config.tip_accounts, rng, blockhash)?;
                    submitter.submit_group(Some(&tip), &txs).await
                }
                GroupPath::Individual => {
                    join_all(txs.iter().map(|tx| submitter.send_one(tx, SubmissionPath::Individual))).await
                }
            };
            for ((i, trade), outcome) in group.iter().zip(outcomes) {
                results[*i] = Some(
                    outcome
                        .into_result(Some(trade.wallet.pubkey().to_string()))
                        .with_amounts(trade.lamports, trade.token_amount),
                );
            }
        }

        let transactions: Vec<TransactionResult> = results
            .into_iter()
            .zip(wallets)
            .map(|(r, w)| {
                r.unwrap_or_else(|| {
                    TransactionResult::failure(Some(w.pubkey().to_string()), SubmissionPath::NotSubmitted, "not sent")
                })
            })
            .collect();
        let mut result = SellResult::reconcile(mint.to_string(), transactions);

        if self.kill_switch.load(Ordering::SeqCst) {
            warn!("Kill switch set after submission, portfolio recording skipped");
        } else {
            for tx in result.transactions.iter().filter(|t| t.success) {
                let wallet = tx.wallet.clone().unwrap_or_default();
                let record = TradeRecord::new(
                    wallet.clone(),
                    result.mint.clone(),
                    TradeSide::Sell,
                    tx.token_amount,
                    tx.lamports,
                    tx.signature.clone(),
                );
                if let Err(e) = self.portfolio.record_sell(record).await {
                    error!("Failed to record sell for {}: {}", wallet, e);
                    result.recording_errors.push(format!("{}: {}", wallet, e));
                }
            }
        }
        info!(
            "Sell of {} finished: {:.0}% of {} wallets succeeded",
            result.mint,
            result.success_rate * 100.0,
            result.transactions.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_amount_takes_a_share() {
        assert_eq!(sell_amount(1_000, 100), 1_000);
        assert_eq!(sell_amount(1_000, 25), 250);
        assert_eq!(sell_amount(3, 50), 1);
        assert_eq!(sell_amount(u64::MAX, 100), u64::MAX);
        assert_eq!(sell_amount(0, 100), 0);
    }
}
