use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Env;
use log::info;
use solana_pumpfun_bundler::commands::{
    alt_command, launch_command, sell_command, wallets_command, AltArgs, LaunchArgs, SellArgs, WalletsArgs,
};
use solana_pumpfun_bundler::config::Settings;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pumpfun-bundler",
    version,
    about = "Launch and sell pump.fun tokens across many wallets, bundled through Jito",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./bundler_settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a token and buy it from fresh wallets in the same block (or spread over blocks)
    Launch(LaunchArgs),
    /// Sell a token from every wallet in a wallet file
    Sell(SellArgs),
    /// Generate or list bundler wallets
    Wallets(WalletsArgs),
    /// Create or extend an address lookup table for a mint and wallet file
    Alt(AltArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;
    info!("Starting pumpfun-bundler");

    match cli.command {
        Commands::Launch(args) => launch_command(&settings, args).await.context("Launch failed")?,
        Commands::Sell(args) => sell_command(&settings, args).await.context("Sell failed")?,
        Commands::Wallets(args) => wallets_command(&settings, args)
            .await
            .context("Wallet command failed")?,
        Commands::Alt(args) => alt_command(&settings, args)
            .await
            .context("Lookup table command failed")?,
    }
    Ok(())
}
