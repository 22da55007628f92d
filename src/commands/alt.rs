use crate::bundler::alt::AddressTableManager;
use crate::bundler::builder::{BuilderConfig, TransactionBuilder};
use crate::chain::ConfirmTiming;
use crate::commands::connect;
use crate::config::Settings;
use crate::errors::Result;
use crate::pump_instruction_builders::launch_table_addresses;
use crate::wallet::{main_wallet_from_base58, KeypairPool};
use clap::Args;
use console::Style;
use log::{info, warn};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Args, Debug, Clone)]
pub struct AltArgs {
    /// Token mint whose trade accounts go into the table
    #[arg(short, long)]
    pub mint: String,
    /// Wallet file with the trading wallets
    #[arg(short, long)]
    pub wallet_file: PathBuf,
    /// Extend this existing table instead of creating a new one
    #[arg(long)]
    pub table: Option<String>,
}

/// Creates (or extends) a lookup table holding a mint's trade accounts and the
/// wallets' token accounts.
pub async fn alt_command(settings: &Settings, args: AltArgs) -> Result<()> {
    let info_style = Style::new().cyan();
    let mint = Pubkey::from_str(&args.mint)?;
    let wallets = KeypairPool::open(&args.wallet_file)?.load()?;
    let main_wallet = main_wallet_from_base58(&settings.main_wallet_private_key)?;
    let chain = connect(settings)?;

    let builder = TransactionBuilder::new(chain.clone(), BuilderConfig::default());
    let creator = match builder.fetch_curve(&mint).await {
        Ok(curve) => curve.creator,
        Err(e) => {
            warn!("Curve for {} unreadable ({}); assuming the main wallet created it", mint, e);
            main_wallet.pubkey()
        }
    };
    let traders: Vec<Pubkey> = wallets.iter().map(|w| w.pubkey()).collect();
    let addresses = launch_table_addresses(&mint, &creator, &traders);

    let timing = ConfirmTiming {
        window: settings.confirmation_window(),
        poll: settings.confirmation_poll(),
    };
    let mut manager = AddressTableManager::new(chain, main_wallet, settings.priority_fee_micro_lamports, timing);
    match &args.table {
        Some(existing) => manager.attach(Pubkey::from_str(existing)?).await?,
        None => {
            manager.create().await?;
        }
    }
    let batches = manager.extend(&addresses).await?;
    manager.wait_until_active().await?;
    let table = manager.lookup_account()?;
    info!("Lookup table {} holds {} addresses", table.key, table.addresses.len());

    println!(
        "\n{} {} ({} addresses, {} new in {} batch(es))",
        info_style.apply_to("Lookup table ready:").bold(),
        table.key,
        table.addresses.len(),
        batches.iter().sum::<usize>(),
        batches.len()
    );
    Ok(())
}
