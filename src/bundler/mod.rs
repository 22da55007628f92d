//! Launch orchestration: wallets, funding, lookup table, buys, submission and
//! reconciliation, in that order.

pub mod alt;
pub mod builder;
pub mod planner;
pub mod relay;
pub mod seller;
pub mod stealth;

use crate::api::jito::BundleRelay;
use crate::api::pumpfun::MetadataUploader;
use crate::chain::{send_and_confirm, ChainConnection, ConfirmTiming};
use crate::config::Settings;
use crate::errors::{BundlerError, Result};
use crate::models::result::{BundleResult, Confirmation, SubmissionPath, TransactionResult};
use crate::models::strategy::{DistributionStrategy, GroupPath};
use crate::models::token::TokenMetadata;
use crate::models::wallet::Wallet;
use crate::models::LaunchState;
use crate::portfolio::{PortfolioRecorder, TradeRecord, TradeSide};
use crate::pump_instruction_builders::{launch_table_addresses, BondingCurveAccount};
use crate::wallet::KeypairPool;
use alt::AddressTableManager;
use builder::{BuilderConfig, PreparedTrade, TransactionBuilder};
use log::{error, info, warn};
use rand::Rng;
use relay::{FallbackPolicy, RelaySubmitter, TxOutcome, MAX_BUNDLE_TRANSACTIONS};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stealth::{StealthScheduler, StealthTiming};

pub use seller::{SellRequest, Seller};

/// Transfers per funding transaction.
pub const FUNDING_BATCH_SIZE: usize = 8;
/// Rent and fees the main wallet keeps for create, lookup table and funding transactions.
pub const CREATE_RESERVE_LAMPORTS: u64 = 50_000_000;

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub metadata: TokenMetadata,
    pub wallet_count: usize,
    pub total_buy_lamports: u64,
    pub dev_buy_lamports: u64,
    pub strategy: DistributionStrategy,
    pub wallet_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tip_lamports: u64,
    pub tip_accounts: Vec<Pubkey>,
    pub funding_buffer_lamports: u64,
    pub max_trades_per_tx: usize,
    pub priority_fee_micro_lamports: u64,
    pub confirm: ConfirmTiming,
    pub stealth_timing: StealthTiming,
    pub individual_retries: usize,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            tip_lamports: settings.jito_tip_lamports,
            tip_accounts: settings.tip_accounts()?,
            funding_buffer_lamports: settings.funding_buffer_lamports,
            max_trades_per_tx: settings.max_trades_per_tx,
            priority_fee_micro_lamports: settings.priority_fee_micro_lamports,
            confirm: ConfirmTiming {
                window: settings.confirmation_window(),
                poll: settings.confirmation_poll(),
            },
            stealth_timing: StealthTiming {
                block_interval: Duration::from_millis(settings.block_interval_ms),
                block_jitter: Duration::from_millis(settings.block_jitter_ms),
                jitter: true,
            },
            individual_retries: settings.individual_retries,
        })
    }
}

/// Owns one launch end to end. Collaborators are injected so the same flow runs
/// against live services or test doubles.
pub struct BundleOrchestrator {
    chain: Arc<dyn ChainConnection>,
    relay: Arc<dyn BundleRelay>,
    uploader: Arc<dyn MetadataUploader>,
    portfolio: Arc<dyn PortfolioRecorder>,
    main_wallet: Wallet,
    policy: FallbackPolicy,
    config: OrchestratorConfig,
    kill_switch: Arc<AtomicBool>,
    state: Mutex<Option<LaunchState>>,
}

/// Per-wallet bookkeeping while a launch is in flight.
struct Slot {
    wallet: Wallet,
    planned: u64,
    trade: Option<PreparedTrade>,
    result: Option<TransactionResult>,
}

impl Slot {
    fn fail(&mut self, path: SubmissionPath, error: impl Into<String>) {
        if self.result.is_none() {
            self.result = Some(
                TransactionResult::failure(Some(self.wallet.pubkey().to_string()), path, error)
                    .with_amounts(self.planned, 0),
            );
        }
    }

    fn pending(&self) -> bool {
        self.result.is_none() && self.trade.is_some()
    }
}

fn outcome_result(outcome: TxOutcome, wallet: &Wallet, lamports: u64, token_amount: u64) -> TransactionResult {
    outcome
        .into_result(Some(wallet.pubkey().to_string()))
        .with_amounts(lamports, token_amount)
}

impl BundleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainConnection>,
        relay: Arc<dyn BundleRelay>,
        uploader: Arc<dyn MetadataUploader>,
        portfolio: Arc<dyn PortfolioRecorder>,
        main_wallet: Wallet,
        policy: FallbackPolicy,
        config: OrchestratorConfig,
        kill_switch: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chain,
            relay,
            uploader,
            portfolio,
            main_wallet,
            policy,
            config,
            kill_switch,
            state: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Option<LaunchState> {
        self.state.lock().ok().and_then(|s| *s)
    }

    fn advance(&self, next: LaunchState) {
        info!("Launch state -> {:?}", next);
        if let Ok(mut state) = self.state.lock() {
            *state = Some(next);
        }
    }

    fn killed(&self) -> bool {
        self.kill_switch.load(Ordering::SeqCst)
    }

    fn check_kill(&self, before: &str) -> Result<()> {
        if self.killed() {
            warn!("Kill switch set, aborting before {}", before);
            return Err(BundlerError::Aborted(before.to_string()));
        }
        Ok(())
    }

    fn submitter(&self) -> RelaySubmitter {
        RelaySubmitter::new(
            self.chain.clone(),
            self.relay.clone(),
            self.policy.clone(),
            self.config.confirm,
            self.config.individual_retries,
        )
    }

    fn builder(&self, strategy: &DistributionStrategy) -> TransactionBuilder {
        let priority_fee = if strategy.priority_fee_micro_lamports > 0 {
            strategy.priority_fee_micro_lamports
        } else {
            self.config.priority_fee_micro_lamports
        };
        TransactionBuilder::new(
            self.chain.clone(),
            BuilderConfig {
                priority_fee_micro_lamports: priority_fee,
                max_trades_per_tx: self.config.max_trades_per_tx,
                launch_mode: strategy.launch_mode,
            },
        )
    }

    /// Everything the main wallet must hold before anything is signed. Tips are
    /// bounded by one per wallet plus one for the creation bundle.
    pub fn required_balance(&self, request: &LaunchRequest, planned: &[u64]) -> u64 {
        let buys: u64 = planned.iter().sum();
        let buffers = self.config.funding_buffer_lamports * request.wallet_count as u64;
        let tips = self.config.tip_lamports * (request.wallet_count as u64 + 1);
        buys + buffers + tips + request.dev_buy_lamports + CREATE_RESERVE_LAMPORTS
    }

    fn validate(&self, request: &LaunchRequest) -> Result<()> {
        if request.wallet_count == 0 {
            return Err(BundlerError::Config("wallet count must be greater than zero".to_string()));
        }
        if request.total_buy_lamports == 0 {
            return Err(BundlerError::Config("total buy amount must be greater than zero".to_string()));
        }
        if request.strategy.slippage_bps > 10_000 {
            return Err(BundlerError::Config(format!(
                "slippage of {} bps exceeds 100%",
                request.strategy.slippage_bps
            )));
        }
        if request.metadata.name.trim().is_empty() || request.metadata.symbol.trim().is_empty() {
            return Err(BundlerError::Config("token name and symbol are required".to_string()));
        }
        if request.wallet_file.exists() {
            return Err(BundlerError::Config(format!(
                "wallet file {} already exists; choose a new path so earlier launch keys are kept",
                request.wallet_file.display()
            )));
        }
        Ok(())
    }

    /// Runs one launch. Configuration problems fail before any signing; per-wallet
    /// failures after that are reported in the result, one entry per wallet.
    pub async fn launch<R: Rng + Send + ?Sized>(&self, request: LaunchRequest, rng: &mut R) -> Result<BundleResult> {
        self.validate(&request)?;
        let strategy = request.strategy.clone();
        let planned = planner::plan(
            request.total_buy_lamports,
            request.wallet_count,
            &strategy.allocation,
            strategy.variance_percent,
            rng,
        )?;
        let required = self.required_balance(&request, &planned);
        let balance = self.chain.get_balance(&self.main_wallet.pubkey()).await?;
        if balance < required {
            return Err(BundlerError::Config(format!(
                "main wallet holds {} lamports, launch needs {}",
                balance, required
            )));
        }
        self.check_kill("wallet generation")?;

        // Created
        let mut pool = KeypairPool::new(&request.wallet_file);
        let wallets = pool.generate(request.wallet_count)?;
        let uri = self.uploader.upload(&request.metadata).await?;
        let mint = Keypair::new();
        let mint_pk = mint.pubkey();
        info!("Launching {} ({}) as {}", request.metadata.name, request.metadata.symbol, mint_pk);
        self.advance(LaunchState::Created);

        let mut slots: Vec<Slot> = wallets
            .into_iter()
            .zip(planned.iter().copied())
            .map(|(wallet, planned)| Slot {
                wallet,
                planned,
                trade: None,
                result: None,
            })
            .collect();

        // Funded
        self.check_kill("funding")?;
        self.fund(&mut slots).await?;
        self.advance(LaunchState::Funded);

        // LUTReady
        self.check_kill("lookup table setup")?;
        let funded: Vec<Pubkey> = slots
            .iter()
            .filter(|s| s.result.is_none())
            .map(|s| s.wallet.pubkey())
            .collect();
        let table = self.prepare_table(&mint_pk, &funded).await;
        self.advance(LaunchState::LutReady);

        let creation = match self
            .build_and_submit(&request, &strategy, &uri, &mint, &mut slots, table.as_ref(), rng)
            .await
        {
            Ok(creation) => creation,
            Err(e @ BundlerError::Aborted(_)) => return Err(e),
            Err(e) => {
                error!("Launch {} stopped after funding: {}", mint_pk, e);
                for slot in slots.iter_mut() {
                    slot.fail(SubmissionPath::NotSubmitted, format!("launch stopped after funding: {}", e));
                }
                TransactionResult::failure(
                    Some(self.main_wallet.pubkey().to_string()),
                    SubmissionPath::NotSubmitted,
                    e.to_string(),
                )
            }
        };

        // Reconciled
        let transactions: Vec<TransactionResult> = slots
            .into_iter()
            .map(|mut slot| {
                slot.fail(SubmissionPath::NotSubmitted, "no result recorded");
                slot.result.unwrap_or_else(|| {
                    TransactionResult::failure(None, SubmissionPath::NotSubmitted, "no result recorded")
                })
            })
            .collect();
        let mut result = BundleResult::reconcile(mint_pk.to_string(), creation, transactions);
        result.wallet_file = Some(pool.path().to_path_buf());
        result.lookup_table = table.as_ref().map(|t| t.key.to_string());
        if result.degraded {
            warn!("Launch {} used the sequential fallback path", mint_pk);
        }

        if self.killed() {
            warn!("Kill switch set after submission, portfolio recording skipped");
        } else {
            result.recording_errors = self.record(&result, request.dev_buy_lamports).await;
        }
        self.advance(LaunchState::Reconciled);
        info!(
            "Launch {} reconciled: {}/{} buys landed ({:.0}%)",
            result.mint,
            result.successes(),
            result.transactions.len(),
            result.success_rate * 100.0
        );
        Ok(result)
    }

    /// Builds creation and buys, then submits them. Errors here come after
    /// funding, so the caller turns them into per-wallet failures.
    #[allow(clippy::too_many_arguments)]
    async fn build_and_submit<R: Rng + Send + ?Sized>(
        &self,
        request: &LaunchRequest,
        strategy: &DistributionStrategy,
        uri: &str,
        mint: &Keypair,
        slots: &mut [Slot],
        table: Option<&AddressLookupTableAccount>,
        rng: &mut R,
    ) -> Result<TransactionResult> {
        // BuysBuilt
        self.check_kill("building buys")?;
        let mint_pk = mint.pubkey();
        let builder = self.builder(strategy);
        let global = builder.fetch_global_state().await?;
        let mut projection = BondingCurveAccount::initial(&global, self.main_wallet.pubkey());
        let blockhash = self.chain.get_latest_blockhash().await?;
        let create_tx = builder.build_create(
            &self.main_wallet,
            mint,
            &request.metadata,
            uri,
            &mut projection,
            request.dev_buy_lamports,
            strategy.slippage_bps,
            blockhash,
        )?;
        if !strategy.stealth.is_stealth() {
            for slot in slots.iter_mut().filter(|s| s.result.is_none()) {
                match builder.build_buy_projected(&mut projection, &mint_pk, slot.planned, strategy.slippage_bps, &slot.wallet) {
                    Ok(trade) => slot.trade = Some(trade),
                    Err(e) => slot.fail(SubmissionPath::NotSubmitted, e.to_string()),
                }
            }
        }
        self.advance(LaunchState::BuysBuilt);

        // Submitted
        self.check_kill("submission")?;
        let submitter = Arc::new(self.submitter());
        let creation = if strategy.stealth.is_stealth() {
            self.submit_stealth(&builder, submitter, strategy, &mint_pk, create_tx, slots, table, rng)
                .await?
        } else {
            self.submit_atomic(&builder, &submitter, create_tx, slots, table, rng)
                .await?
        };
        self.advance(LaunchState::Submitted);
        Ok(creation)
    }

    async fn fund(&self, slots: &mut [Slot]) -> Result<()> {
        let builder = self.builder(&DistributionStrategy::default());
        for (batch_idx, batch) in slots.chunks_mut(FUNDING_BATCH_SIZE).enumerate() {
            let transfers: Vec<(Pubkey, u64)> = batch
                .iter()
                .map(|s| (s.wallet.pubkey(), s.planned + self.config.funding_buffer_lamports))
                .collect();
            let label = format!("funding batch {}", batch_idx + 1);
            let sent = async {
                let blockhash = self.chain.get_latest_blockhash().await?;
                let tx = builder.build_transfers(&self.main_wallet, &transfers, blockhash)?;
                send_and_confirm(self.chain.as_ref(), &tx, &label, self.config.confirm).await
            }
            .await;
            if let Err(e) = sent {
                error!("{} failed: {}", label, e);
                for slot in batch.iter_mut() {
                    slot.fail(SubmissionPath::NotSubmitted, format!("funding failed: {}", e));
                }
            }
        }
        if slots.iter().all(|s| s.result.is_some()) {
            return Err(BundlerError::Transport("no bundler wallet could be funded".to_string()));
        }
        Ok(())
    }

    async fn prepare_table(&self, mint: &Pubkey, traders: &[Pubkey]) -> Option<AddressLookupTableAccount> {
        let mut manager = AddressTableManager::new(
            self.chain.clone(),
            self.main_wallet.clone(),
            self.config.priority_fee_micro_lamports,
            self.config.confirm,
        );
        let addresses = launch_table_addresses(mint, &self.main_wallet.pubkey(), traders);
        let outcome = async {
            manager.create().await?;
            manager.extend(&addresses).await?;
            manager.wait_until_active().await?;
            manager.lookup_account()
        }
        .await;
        match outcome {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Lookup table unavailable ({}); packing without it", e);
                None
            }
        }
    }

    /// Creation and packed buys in bundles of at most five, each led by a tip.
    /// The first bundle carries the create transaction.
    async fn submit_atomic<R: Rng + Send + ?Sized>(
        &self,
        builder: &TransactionBuilder,
        submitter: &RelaySubmitter,
        create_tx: VersionedTransaction,
        slots: &mut [Slot],
        table: Option<&AddressLookupTableAccount>,
        rng: &mut R,
    ) -> Result<TransactionResult> {
        let owners: Vec<usize> = (0..slots.len()).filter(|i| slots[*i].pending()).collect();
        let trades: Vec<PreparedTrade> = owners.iter().filter_map(|i| slots[*i].trade.clone()).collect();
        let blockhash = self.chain.get_latest_blockhash().await?;
        let packed = builder.pack(&trades, table, blockhash)?;

        let main_label = Some(self.main_wallet.pubkey().to_string());
        let mut creation: Option<TransactionResult> = None;
        let mut queue = packed.into_iter().peekable();
        let mut first = true;

        while first || queue.peek().is_some() {
            let room = if first { MAX_BUNDLE_TRANSACTIONS - 2 } else { MAX_BUNDLE_TRANSACTIONS - 1 };
            let chunk: Vec<_> = queue.by_ref().take(room).collect();

            let tip = match builder.build_tip(&self.main_wallet, self.config.tip_lamports, &self.config.tip_accounts, rng, blockhash) {
                Ok(tip) => tip,
                Err(e) if first => return Err(e),
                Err(e) => {
                    error!("Tip for a follow-up bundle failed: {}", e);
                    for slot in slots.iter_mut() {
                        slot.fail(SubmissionPath::NotSubmitted, format!("bundle tip failed: {}", e));
                    }
                    break;
                }
            };
            let mut bundle = vec![tip];
            if first {
                bundle.push(create_tx.clone());
            }
            bundle.extend(chunk.iter().map(|p| p.transaction.clone()));

            let outcomes = match submitter.dispatch(&bundle, 1, first).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    error!("Bundle dispatch failed: {}", e);
                    bundle[1..].iter().map(|tx| TxOutcome::not_submitted(tx, e.to_string())).collect()
                }
            };
            let mut outcomes = outcomes.into_iter();
            if first {
                if let Some(outcome) = outcomes.next() {
                    let landed = outcome.success;
                    creation = Some(outcome.into_result(main_label.clone()));
                    if !landed {
                        error!("Token creation failed, remaining buys are abandoned");
                        for slot in slots.iter_mut() {
                            slot.fail(SubmissionPath::NotSubmitted, "token creation failed");
                        }
                        break;
                    }
                }
            }
            for (packed_tx, outcome) in chunk.iter().zip(outcomes) {
                for member in &packed_tx.members {
                    let slot = &mut slots[owners[*member]];
                    let (lamports, tokens) = slot.trade.as_ref().map(|t| (t.lamports, t.token_amount)).unwrap_or_default();
                    slot.result = Some(outcome_result(outcome.clone(), &slot.wallet, lamports, tokens));
                }
            }
            first = false;
        }

        Ok(creation.unwrap_or_else(|| {
            TransactionResult::failure(main_label, SubmissionPath::NotSubmitted, "creation was not submitted")
        }))
    }

    /// Creation confirmed first, then buys rebuilt against the live curve and
    /// spread over blocks.
    #[allow(clippy::too_many_arguments)]
    async fn submit_stealth<R: Rng + Send + ?Sized>(
        &self,
        builder: &TransactionBuilder,
        submitter: Arc<RelaySubmitter>,
        strategy: &DistributionStrategy,
        mint: &Pubkey,
        create_tx: VersionedTransaction,
        slots: &mut [Slot],
        table: Option<&AddressLookupTableAccount>,
        rng: &mut R,
    ) -> Result<TransactionResult> {
        let main_label = Some(self.main_wallet.pubkey().to_string());
        let creation = submitter
            .send_one(&create_tx, SubmissionPath::Individual)
            .await
            .into_result(main_label);
        if !creation.success {
            error!("Token creation failed: {:?}", creation.error);
            for slot in slots.iter_mut() {
                slot.fail(SubmissionPath::NotSubmitted, "token creation failed");
            }
            return Ok(creation);
        }

        if let Err(e) = self
            .stealth_buys(builder, submitter, strategy, mint, slots, table, rng)
            .await
        {
            error!("Stealth buys stopped after creation: {}", e);
            for slot in slots.iter_mut() {
                slot.fail(SubmissionPath::NotSubmitted, format!("stealth buys stopped: {}", e));
            }
        }
        Ok(creation)
    }

    #[allow(clippy::too_many_arguments)]
    async fn stealth_buys<R: Rng + Send + ?Sized>(
        &self,
        builder: &TransactionBuilder,
        submitter: Arc<RelaySubmitter>,
        strategy: &DistributionStrategy,
        mint: &Pubkey,
        slots: &mut [Slot],
        table: Option<&AddressLookupTableAccount>,
        rng: &mut R,
    ) -> Result<()> {
        for slot in slots.iter_mut().filter(|s| s.result.is_none()) {
            match builder.build_buy(mint, slot.planned, strategy.slippage_bps, &slot.wallet).await {
                Ok(trade) => slot.trade = Some(trade),
                Err(e) => slot.fail(SubmissionPath::NotSubmitted, e.to_string()),
            }
        }

        let owners: Vec<usize> = (0..slots.len()).filter(|i| slots[*i].pending()).collect();
        if owners.is_empty() {
            return Ok(());
        }
        let blockhash = self.chain.get_latest_blockhash().await?;
        let mut member_txs = Vec::with_capacity(owners.len());
        for i in &owners {
            let trade = slots[*i]
                .trade
                .as_ref()
                .ok_or_else(|| BundlerError::Build("pending slot without a trade".to_string()))?;
            member_txs.push(builder.sign_single(trade, table, blockhash)?);
        }

        let timing = self.config.stealth_timing.with_jitter(strategy.jitter);
        let scheduler = StealthScheduler::new(submitter, timing);
        let plan = scheduler.plan(owners.len(), strategy.stealth, rng)?;
        let mut tips = Vec::with_capacity(plan.groups.len());
        for group in &plan.groups {
            tips.push(match group.path {
                GroupPath::AtomicBundle => Some(builder.build_tip(
                    &self.main_wallet,
                    self.config.tip_lamports,
                    &self.config.tip_accounts,
                    rng,
                    blockhash,
                )?),
                GroupPath::Individual => None,
            });
        }

        let outcomes = scheduler.execute(&plan, &member_txs, &tips).await?;
        for (member, outcome) in outcomes.into_iter().enumerate() {
            let slot = &mut slots[owners[member]];
            let (lamports, tokens) = slot.trade.as_ref().map(|t| (t.lamports, t.token_amount)).unwrap_or_default();
            slot.result = Some(outcome_result(outcome, &slot.wallet, lamports, tokens));
        }
        Ok(())
    }

    async fn record(&self, result: &BundleResult, dev_buy_lamports: u64) -> Vec<String> {
        let mut errors = Vec::new();
        let mut records: Vec<TradeRecord> = result
            .transactions
            .iter()
            .filter(|t| t.success)
            .map(|t| {
                TradeRecord::new(
                    t.wallet.clone().unwrap_or_default(),
                    result.mint.clone(),
                    TradeSide::Buy,
                    t.token_amount,
                    t.lamports,
                    t.signature.clone(),
                )
            })
            .collect();
        if dev_buy_lamports > 0 && result.creation.success {
            // Dev buy lands with the create; only its spend is known here.
            records.push(TradeRecord::new(
                self.main_wallet.pubkey().to_string(),
                result.mint.clone(),
                TradeSide::Buy,
                0,
                dev_buy_lamports,
                result.creation.signature.clone(),
            ));
        }
        for record in records {
            let wallet = record.wallet.clone();
            if let Err(e) = self.portfolio.record_buy(record).await {
                error!("Failed to record buy for {}: {}", wallet, e);
                errors.push(format!("{}: {}", wallet, e));
            }
        }
        errors
    }
}

/// Confirmation label used in summaries.
pub fn confirmation_label(confirmation: Confirmation) -> &'static str {
    match confirmation {
        Confirmation::Confirmed => "confirmed",
        Confirmation::Probabilistic => "assumed (no status)",
        Confirmation::Unconfirmed => "unconfirmed",
    }
}
