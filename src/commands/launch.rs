use crate::api::jito::JitoRelayClient;
use crate::api::pumpfun::PumpIpfsUploader;
use crate::bundler::relay::FallbackPolicy;
use crate::bundler::{BundleOrchestrator, LaunchRequest, OrchestratorConfig};
use crate::commands::{connect, install_kill_switch, print_results, seeded_rng};
use crate::config::Settings;
use crate::errors::{BundlerError, Result};
use crate::models::strategy::{Allocation, DistributionStrategy, LaunchMode, StealthMode};
use crate::models::token::TokenMetadata;
use crate::portfolio::JsonPortfolio;
use crate::wallet::{launch_wallet_path, main_wallet_from_base58};
use clap::{Args, ValueEnum};
use console::Style;
use log::info;
use solana_sdk::native_token::{lamports_to_sol, sol_to_lamports};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationShape {
    Equal,
    Weighted,
    Custom,
}

#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    /// Token name
    #[arg(short, long)]
    pub name: String,
    /// Token symbol
    #[arg(short, long)]
    pub symbol: String,
    #[arg(long, default_value = "")]
    pub description: String,
    /// Local image path or URL
    #[arg(long)]
    pub image: Option<String>,
    #[arg(long)]
    pub twitter: Option<String>,
    #[arg(long)]
    pub telegram: Option<String>,
    #[arg(long)]
    pub website: Option<String>,
    /// Number of fresh bundler wallets
    #[arg(short, long, default_value_t = 5)]
    pub wallets: usize,
    /// Total SOL spent by the bundler wallets
    #[arg(long)]
    pub total_sol: f64,
    /// SOL the creator buys inside the create transaction
    #[arg(long, default_value_t = 0.0)]
    pub dev_buy_sol: f64,
    #[arg(long, value_enum, default_value_t = AllocationShape::Equal)]
    pub allocation: AllocationShape,
    /// Weights (weighted) or lamport amounts (custom), comma separated
    #[arg(long, value_delimiter = ',')]
    pub weights: Vec<u64>,
    /// Per-wallet amount variance, in percent
    #[arg(long, default_value_t = 0.0)]
    pub variance: f64,
    #[arg(long, value_enum, default_value_t = StealthMode::None)]
    pub stealth: StealthMode,
    /// Fixed stealth group delays and block gaps instead of randomized ones
    #[arg(long)]
    pub no_jitter: bool,
    #[arg(long, value_enum, default_value_t = LaunchMode::Classic)]
    pub mode: LaunchMode,
    #[arg(long, default_value_t = 500)]
    pub slippage_bps: u64,
    /// Overrides the configured priority fee (micro-lamports per CU)
    #[arg(long)]
    pub priority_fee: Option<u64>,
    /// Seed for amount variance, tip account choice and stealth grouping
    #[arg(long)]
    pub seed: Option<u64>,
    /// Where to write the generated wallets (defaults to a timestamped file in wallet_dir)
    #[arg(long)]
    pub wallet_file: Option<PathBuf>,
}

impl LaunchArgs {
    fn allocation(&self) -> Result<Allocation> {
        match self.allocation {
            AllocationShape::Equal => Ok(Allocation::Equal),
            AllocationShape::Weighted | AllocationShape::Custom if self.weights.is_empty() => Err(
                BundlerError::Config("--weights is required for weighted and custom allocations".to_string()),
            ),
            AllocationShape::Weighted => Ok(Allocation::Weighted(self.weights.clone())),
            AllocationShape::Custom => Ok(Allocation::Custom(self.weights.clone())),
        }
    }

    pub fn into_request(self, settings: &Settings) -> Result<LaunchRequest> {
        let strategy = DistributionStrategy {
            allocation: self.allocation()?,
            variance_percent: self.variance,
            jitter: !self.no_jitter,
            stealth: self.stealth,
            slippage_bps: self.slippage_bps,
            priority_fee_micro_lamports: self.priority_fee.unwrap_or(0),
            launch_mode: self.mode,
        };
        let metadata = TokenMetadata {
            image: self.image,
            twitter: self.twitter,
            telegram: self.telegram,
            website: self.website,
            ..TokenMetadata::new(self.name, self.symbol, self.description)
        };
        Ok(LaunchRequest {
            metadata,
            wallet_count: self.wallets,
            total_buy_lamports: sol_to_lamports(self.total_sol),
            dev_buy_lamports: sol_to_lamports(self.dev_buy_sol),
            strategy,
            wallet_file: self
                .wallet_file
                .unwrap_or_else(|| launch_wallet_path(&settings.wallet_dir)),
        })
    }
}

pub async fn launch_command(settings: &Settings, args: LaunchArgs) -> Result<()> {
    let info_style = Style::new().cyan();
    let warn_style = Style::new().yellow().bold();
    let seed = args.seed;
    let request = args.into_request(settings)?;

    println!(
        "\n{} {} ({}) with {} wallets, {} SOL total",
        info_style.apply_to("Launching").bold(),
        request.metadata.name,
        request.metadata.symbol,
        request.wallet_count,
        lamports_to_sol(request.total_buy_lamports)
    );

    let main_wallet = main_wallet_from_base58(&settings.main_wallet_private_key)?;
    info!("Main wallet: {}", main_wallet.pubkey());
    let orchestrator = BundleOrchestrator::new(
        connect(settings)?,
        Arc::new(JitoRelayClient::new()),
        Arc::new(PumpIpfsUploader::new(settings.ipfs_api_url.clone())),
        Arc::new(JsonPortfolio::new(settings.portfolio_path.clone())),
        main_wallet,
        FallbackPolicy::from_settings(settings),
        OrchestratorConfig::from_settings(settings)?,
        install_kill_switch(),
    );

    let mut rng = seeded_rng(seed);
    let result = orchestrator.launch(request, &mut rng).await?;

    println!("\n{} {}", info_style.apply_to("Mint:"), result.mint);
    if let Some(path) = &result.wallet_file {
        println!("{} {}", info_style.apply_to("Wallet file:"), path.display());
    }
    if let Some(table) = &result.lookup_table {
        println!("{} {}", info_style.apply_to("Lookup table:"), table);
    }
    println!("\nCreation:");
    print_results(std::slice::from_ref(&result.creation));
    println!("\nBuys:");
    print_results(&result.transactions);
    println!(
        "\n{} {}/{} landed ({:.1}%), average confirmation {}",
        info_style.apply_to("Summary:"),
        result.successes(),
        result.transactions.len(),
        result.success_rate * 100.0,
        result
            .average_confirmation_ms
            .map(|ms| format!("{:.0} ms", ms))
            .unwrap_or_else(|| "n/a".to_string())
    );
    if result.degraded {
        println!(
            "{}",
            warn_style.apply_to("Relays were unavailable: buys went out one by one, unbundled and exposed to MEV.")
        );
    }
    for e in &result.recording_errors {
        println!("{} portfolio not updated: {}", warn_style.apply_to("!"), e);
    }
    Ok(())
}
