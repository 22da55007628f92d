use crate::chain::ChainConnection;
use crate::commands::connect;
use crate::config::Settings;
use crate::errors::{BundlerError, Result};
use crate::wallet::{launch_wallet_path, KeypairPool};
use clap::Args;
use console::Style;
use prettytable::{row, Table};
use solana_program::native_token::lamports_to_sol;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct WalletsArgs {
    /// Wallet file to list or append to
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Generate this many new wallets into the file
    #[arg(long)]
    pub generate: Option<usize>,
    /// Fetch SOL balances for the listing
    #[arg(long)]
    pub balances: bool,
}

pub async fn wallets_command(settings: &Settings, args: WalletsArgs) -> Result<()> {
    let info_style = Style::new().cyan();

    let mut pool = match (&args.file, args.generate) {
        (Some(path), _) if path.exists() => KeypairPool::open(path)?,
        (Some(path), Some(_)) => KeypairPool::new(path),
        (None, Some(_)) => KeypairPool::new(launch_wallet_path(&settings.wallet_dir)),
        (Some(path), None) => {
            return Err(BundlerError::Wallet(format!("wallet file {} does not exist", path.display())))
        }
        (None, None) => {
            return Err(BundlerError::Config("pass --file to list or --generate to create wallets".to_string()))
        }
    };

    if let Some(count) = args.generate {
        pool.generate(count)?;
        println!(
            "{} {} wallet(s) into {}",
            info_style.apply_to("Generated"),
            count,
            pool.path().display()
        );
    }

    let wallets = pool.load()?;
    let chain = if args.balances { Some(connect(settings)?) } else { None };

    let mut table = Table::new();
    if chain.is_some() {
        table.add_row(row!["Name", "Public Key", "SOL"]);
    } else {
        table.add_row(row!["Name", "Public Key"]);
    }
    for wallet in &wallets {
        match &chain {
            Some(chain) => {
                let balance = chain.get_balance(&wallet.pubkey()).await?;
                table.add_row(row![wallet.name, wallet.pubkey(), format!("{:.6}", lamports_to_sol(balance))]);
            }
            None => {
                table.add_row(row![wallet.name, wallet.pubkey()]);
            }
        }
    }
    table.printstd();

    println!("\n{} {} wallet(s) in {}", info_style.apply_to("i"), wallets.len(), pool.path().display());
    println!(
        "{}",
        Style::new()
            .yellow()
            .apply_to("Keep this file secure. It contains private keys.")
    );
    Ok(())
}
