use crate::api::jito::JitoRelayClient;
use crate::bundler::relay::FallbackPolicy;
use crate::bundler::{OrchestratorConfig, SellRequest, Seller};
use crate::commands::{connect, install_kill_switch, print_results, seeded_rng};
use crate::config::Settings;
use crate::errors::Result;
use crate::models::strategy::{LaunchMode, SellMode};
use crate::portfolio::JsonPortfolio;
use crate::wallet::KeypairPool;
use clap::Args;
use console::Style;
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Args, Debug, Clone)]
pub struct SellArgs {
    /// Token mint address
    #[arg(short, long)]
    pub mint: String,
    /// Wallet file written by a launch
    #[arg(short, long)]
    pub wallet_file: PathBuf,
    /// Percentage of each wallet's balance to sell (1-100)
    #[arg(short, long, default_value_t = 100)]
    pub percent: u8,
    #[arg(long, value_enum, default_value_t = SellMode::Regular)]
    pub mode: SellMode,
    #[arg(long, default_value_t = 500)]
    pub slippage_bps: u64,
    /// Launch mode the token was created with
    #[arg(long, value_enum, default_value_t = LaunchMode::Classic)]
    pub launch_mode: LaunchMode,
    #[arg(long)]
    pub seed: Option<u64>,
}

pub async fn sell_command(settings: &Settings, args: SellArgs) -> Result<()> {
    let info_style = Style::new().cyan();
    let mint = Pubkey::from_str(&args.mint)?;
    let wallets = KeypairPool::open(&args.wallet_file)?.load()?;

    println!(
        "\n{} {}% of {} from {} wallets ({:?})",
        info_style.apply_to("Selling").bold(),
        args.percent,
        mint,
        wallets.len(),
        args.mode
    );

    let seller = Seller::new(
        connect(settings)?,
        Arc::new(JitoRelayClient::new()),
        Arc::new(JsonPortfolio::new(settings.portfolio_path.clone())),
        FallbackPolicy::from_settings(settings),
        OrchestratorConfig::from_settings(settings)?,
        install_kill_switch(),
    );
    let request = SellRequest {
        mint,
        percent: args.percent,
        mode: args.mode,
        slippage_bps: args.slippage_bps,
        launch_mode: args.launch_mode,
    };
    let mut rng = seeded_rng(args.seed);
    let result = seller.sell(&request, &wallets, &mut rng).await?;

    print_results(&result.transactions);
    println!(
        "\n{} {:.1}% of {} wallets sold",
        info_style.apply_to("Summary:"),
        result.success_rate * 100.0,
        result.transactions.len()
    );
    for e in &result.recording_errors {
        println!("{} portfolio not updated: {}", Style::new().yellow().apply_to("!"), e);
    }
    Ok(())
}
